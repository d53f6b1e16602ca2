use ppcdrc_backend::CodeBuffer;

#[test]
fn test_emit_and_read() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u8(0x90); // NOP
    buf.emit_u32(0xDEADBEEF);
    assert_eq!(buf.offset(), 5);
    assert_eq!(buf.as_slice()[0], 0x90);
    assert_eq!(buf.read_u32(1), 0xDEADBEEF);
}

#[test]
fn test_patch() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u32(0);
    buf.patch_u32(0, 0x12345678);
    assert_eq!(buf.read_u32(0), 0x12345678);
}

#[test]
fn test_permissions() {
    let buf = CodeBuffer::new(4096).unwrap();
    buf.set_executable().unwrap();
    buf.set_writable().unwrap();
}

#[test]
fn test_size_rounds_to_pages() {
    let buf = CodeBuffer::new(1).unwrap();
    assert!(buf.capacity() >= 4096);
    assert_eq!(buf.capacity() % 4096, 0);
    assert_eq!(buf.remaining(), buf.capacity());
}

#[test]
fn test_addr_offset_roundtrip() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u64(0);
    let addr = buf.addr_at(6);
    assert_eq!(addr, buf.base_ptr() as usize + 6);
    assert_eq!(buf.offset_of(addr), Some(6));
    assert_eq!(buf.offset_of(buf.base_ptr() as usize + buf.capacity()), None);
}

#[test]
fn test_rewind() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u32(0xAAAA_AAAA);
    buf.set_offset(0);
    buf.emit_u8(0xC3);
    assert_eq!(buf.offset(), 1);
    assert_eq!(buf.as_slice(), &[0xC3]);
}
