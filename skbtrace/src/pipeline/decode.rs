//! Perf sample decoding

use skbtrace_common::SkbEvent;

use crate::domain::DecodeError;

/// Decode one perf sample into an event
///
/// Samples may carry trailing padding; only the leading
/// [`SkbEvent::SIZE`] bytes are read.
///
/// # Errors
/// Returns [`DecodeError::Truncated`] for samples shorter than an event.
pub fn decode_event(bytes: &[u8]) -> Result<SkbEvent, DecodeError> {
    if bytes.len() < SkbEvent::SIZE {
        return Err(DecodeError::Truncated { len: bytes.len(), expected: SkbEvent::SIZE });
    }

    // SAFETY: the buffer holds at least size_of::<SkbEvent>() bytes, and
    // SkbEvent is plain integers, so every bit pattern is a valid value.
    #[allow(unsafe_code)]
    let event = unsafe { std::ptr::read_unaligned(bytes.as_ptr().cast::<SkbEvent>()) };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_sample_rejected() {
        for len in [0, 1, SkbEvent::SIZE - 1] {
            let bytes = vec![0u8; len];
            assert_eq!(
                decode_event(&bytes),
                Err(DecodeError::Truncated { len, expected: SkbEvent::SIZE })
            );
        }
    }

    #[test]
    fn test_field_offsets() {
        let mut bytes = vec![0u8; SkbEvent::SIZE + 4];
        bytes[0..4].copy_from_slice(&1234u32.to_ne_bytes());
        bytes[4..8].copy_from_slice(&0xdeadu32.to_ne_bytes());
        bytes[8..16].copy_from_slice(&42u64.to_ne_bytes());
        bytes[16..24].copy_from_slice(&0xffff_ffff_81a2_b3c0u64.to_ne_bytes());

        let event = decode_event(&bytes).unwrap();
        assert_eq!(event.pid, 1234);
        assert_eq!(event.mark, 0xdead);
        assert_eq!(event.timestamp_ns, 42);
        assert_eq!(event.probe_addr, 0xffff_ffff_81a2_b3c0);
    }

    #[test]
    fn test_unaligned_sample() {
        let mut bytes = vec![0u8; SkbEvent::SIZE + 1];
        bytes[1..5].copy_from_slice(&7u32.to_ne_bytes());
        assert_eq!(decode_event(&bytes[1..]).unwrap().pid, 7);
    }
}
