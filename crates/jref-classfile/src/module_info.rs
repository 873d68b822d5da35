use crate::constant_pool::ConstantPool;
use crate::error::Result;
use crate::reader::Reader;

/// Decoded `Module` attribute of a `module-info.class`. Package and class
/// names are dotted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleAttribute {
    pub name: String,
    pub is_open: bool,
    pub requires: Vec<String>,
    pub exports: Vec<String>,
    pub opens: Vec<String>,
    pub uses: Vec<String>,
    pub provides: Vec<(String, Vec<String>)>,
}

impl ModuleAttribute {
    pub(crate) fn parse(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Self> {
        const ACC_OPEN: u16 = 0x0020;

        let name = cp.get_module_name(reader.read_u2()?)?;
        let flags = reader.read_u2()?;
        let _version = reader.read_u2()?;

        let count = reader.read_u2()? as usize;
        let mut requires = Vec::with_capacity(count);
        for _ in 0..count {
            requires.push(cp.get_module_name(reader.read_u2()?)?);
            let _flags = reader.read_u2()?;
            let _version = reader.read_u2()?;
        }

        let exports = parse_package_targets(reader, cp)?;
        let opens = parse_package_targets(reader, cp)?;

        let count = reader.read_u2()? as usize;
        let mut uses = Vec::with_capacity(count);
        for _ in 0..count {
            uses.push(dotted(cp.get_class_name(reader.read_u2()?)?));
        }

        let count = reader.read_u2()? as usize;
        let mut provides = Vec::with_capacity(count);
        for _ in 0..count {
            let service = dotted(cp.get_class_name(reader.read_u2()?)?);
            let with_count = reader.read_u2()? as usize;
            let mut implementations = Vec::with_capacity(with_count);
            for _ in 0..with_count {
                implementations.push(dotted(cp.get_class_name(reader.read_u2()?)?));
            }
            provides.push((service, implementations));
        }

        Ok(Self {
            name,
            is_open: flags & ACC_OPEN != 0,
            requires,
            exports,
            opens,
            uses,
            provides,
        })
    }
}

/// `exports`/`opens` tables share a layout; only the package is kept.
fn parse_package_targets(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Vec<String>> {
    let count = reader.read_u2()? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(dotted(cp.get_package_name(reader.read_u2()?)?));
        let _flags = reader.read_u2()?;
        let to_count = reader.read_u2()? as usize;
        reader.skip(to_count * 2)?;
    }
    Ok(out)
}

fn dotted(internal: String) -> String {
    internal.replace('/', ".")
}
