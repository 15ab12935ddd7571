#![no_main]
use libfuzzer_sys::{fuzz_target, arbitrary::{Arbitrary, Unstructured}};
use assocmem::{Analyzer, BlockHeader, ByteSource};

#[derive(Debug, Arbitrary)]
struct Block {
    offset: u16,
    capacity: u8,
    used_length: u8,
    allocated: bool,
    next: Option<u16>,
    payload: Vec<u8>,
}

// Mostly well-formed headers scattered over a small file, so the walker and
// classifier see plausible chains instead of noise.
fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);

    let blocks: Vec<Block> = match u.arbitrary() {
        Ok(blocks) => blocks,
        Err(_) => return,
    };
    let free_root: Option<u16> = u.arbitrary().unwrap_or(None);

    let len = 1024usize;
    let mut bytes = vec![0u8; len];
    for b in blocks.iter().take(32) {
        let at = (b.offset as usize % len) & !1;
        let header = BlockHeader::new(
            at as u32,
            b.capacity as u16,
            b.used_length as u16,
            b.allocated,
            b.next.map(|n| n as u32 % len as u32),
        );
        let end = (at + 4).min(len);
        bytes[at..end].copy_from_slice(&header.encode()[..end - at]);
        for (i, byte) in b.payload.iter().enumerate() {
            if let Some(slot) = bytes.get_mut(end + i) {
                *slot = *byte;
            }
        }
    }

    let mut builder = Analyzer::builder();
    if let Some(root) = free_root {
        builder = builder.free_root(root as u32 % len as u32);
    }
    let analyzer = match builder.build() {
        Ok(a) => a,
        Err(_) => return,
    };

    let source = match ByteSource::from_bytes(bytes) {
        Ok(s) => s,
        Err(_) => return,
    };
    if let Err(e) = analyzer.analyze(&source) {
        assert!(e.is_format_violation(), "{e}");
    }
});
