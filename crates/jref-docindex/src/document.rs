/// A flat list of `(field, value)` pairs. Fields may repeat.
///
/// Every value is both stored and indexed verbatim as a single term.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[archive(check_bytes)]
pub struct Document {
    fields: Vec<Field>,
}

#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[archive(check_bytes)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.fields.push(Field {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add(name, value);
        self
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |f| f.name == name)
            .map(|f| f.value.as_str())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_fields_keep_insertion_order() {
        let doc = Document::new()
            .with("binaryName", "a.B$C")
            .with("references", "x.Y++----")
            .with("references", "z.W----+-");
        assert_eq!(doc.get("binaryName"), Some("a.B$C"));
        assert_eq!(
            doc.get_all("references").collect::<Vec<_>>(),
            vec!["x.Y++----", "z.W----+-"]
        );
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn values_outlive_the_looked_up_name() {
        let doc = Document::new().with("simpleName", "Widget");
        let value = {
            let name = String::from("simpleName");
            doc.get(&name)
        };
        assert_eq!(value, Some("Widget"));
    }
}
