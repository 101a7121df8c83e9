#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Split the input into a path expression and a document; evaluating
    // any compilable path against any well-formed document should neither
    // panic nor loop.
    if let Ok(s) = std::str::from_utf8(data) {
        let Some((expr, xml)) = s.split_once('\n') else {
            return;
        };
        let (Ok(path), Ok(doc)) = (flatpath::compile(expr), flatpath::Document::parse_str(xml))
        else {
            return;
        };
        for _ in path.iter(doc.root()).take(10_000) {}
    }
});
