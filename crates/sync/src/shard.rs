//! Rendered-output sharding.
//!
//! Both the durable store and the volatile cache cap the size of a single
//! value, so rendered output is split into fixed-size parts: part 0 travels
//! inline with the head record, parts `1..total_parts` are stored
//! separately. The cap sits just under the backing services' 1 MB value
//! limit, leaving headroom for key and metadata overhead.

/// Maximum byte length of a single stored part.
pub const MAX_PART_LEN: usize = 995_000;

/// Split rendered bytes into the inline part 0 and the overflow parts.
///
/// Every part except the last is exactly [`MAX_PART_LEN`] bytes. Empty
/// input still yields an (empty) part 0, so `total_parts` is always
/// `1 + overflow.len()`.
pub fn shard(rendered: &[u8]) -> (Vec<u8>, Vec<Vec<u8>>) {
    let mut chunks = rendered.chunks(MAX_PART_LEN);
    let data0 = chunks.next().unwrap_or_default().to_vec();
    let overflow = chunks.map(<[u8]>::to_vec).collect();
    (data0, overflow)
}

/// Reassemble the original bytes from part 0 and the overflow parts, in
/// part order.
pub fn join(data0: &[u8], overflow: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = data0.len() + overflow.iter().map(Vec::len).sum::<usize>();
    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(data0);
    for part in overflow {
        bytes.extend_from_slice(part);
    }
    bytes
}
