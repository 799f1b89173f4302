//! Client-to-server payload masking.

/// XOR `payload` with `key`, treating `payload[0]` as payload position
/// `offset`.
///
/// The offset lets a payload that arrives across several reads be unmasked
/// chunk by chunk. Applying the same key and offset twice restores the input.
///
/// ```
/// use wiresocket::frame::apply_mask;
///
/// let key = [0x37, 0xFA, 0x21, 0x3D];
/// let mut whole = *b"Hello";
/// apply_mask(&mut whole, key, 0);
///
/// let mut split = *b"Hello";
/// let (head, tail) = split.split_at_mut(2);
/// apply_mask(head, key, 0);
/// apply_mask(tail, key, 2);
/// assert_eq!(whole, split);
/// ```
pub fn apply_mask(payload: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}
