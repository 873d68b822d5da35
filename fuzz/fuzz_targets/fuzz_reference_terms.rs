#![no_main]

use jref_usages::{camel_case_regex, codec, UsageSet};
use libfuzzer_sys::fuzz_target;

mod utils;

fuzz_target!(|data: &[u8]| {
    let Some(text) = utils::truncate_utf8(data) else {
        return;
    };

    // Decoding arbitrary terms must not panic, and whatever decodes must
    // survive a re-encode unchanged.
    if let Some((name, kinds)) = codec::decode_reference(text) {
        let encoded = codec::encode_reference(name, kinds);
        assert_eq!(codec::decode_reference(&encoded), Some((name, kinds)));
    }
    let _ = UsageSet::from_suffix(text);

    // Camel-case patterns are always valid regexes.
    let pattern = camel_case_regex(text);
    assert!(
        regex::Regex::new(&pattern).is_ok(),
        "invalid camel case regex {pattern:?}"
    );
});
