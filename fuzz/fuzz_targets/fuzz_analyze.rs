#![no_main]
use libfuzzer_sys::fuzz_target;
use assocmem::{Analyzer, ByteSource};

// Arbitrary bytes must either decode into a full partition or fail with a
// format violation. Anything else is a bug.
fuzz_target!(|data: &[u8]| {
    let source = match ByteSource::from_bytes(data) {
        Ok(s) => s,
        Err(_) => return,
    };

    match Analyzer::default().analyze(&source) {
        Ok(analysis) => {
            let covered: u64 = analysis.regions().iter().map(|r| r.len() as u64).sum();
            assert_eq!(covered, data.len() as u64);
            for rel in analysis.order.relations() {
                assert!(!analysis.order.precedes(rel.later, rel.earlier));
            }
        }
        Err(e) => assert!(e.is_format_violation(), "{e}"),
    }
});
