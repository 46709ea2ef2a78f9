//! Streaming AES-128-CBC segment decryption.

use std::io::{Read, Write};

use aes::Aes128;
use cipher::{BlockDecryptMut, KeyIvInit, generic_array::GenericArray};
use tracing::warn;

use crate::error::GrabError;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

const BLOCK: usize = 16;
/// 2 MiB read buffer, a whole number of AES blocks.
const BUF_SIZE: usize = 2 * 1024 * 1024;

/// Derives the IV from the segment position when the playlist declares none:
/// the media sequence number, 1-indexed at the first segment, big-endian in
/// the low four bytes of a zeroed 16-octet buffer.
///
/// RFC 8216 would offset this by the playlist's `#EXT-X-MEDIA-SEQUENCE`;
/// sequential position is the behavior relied on here.
pub fn msn_iv(pos: usize) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[12..].copy_from_slice(&((pos as u32) + 1).to_be_bytes());
    iv
}

/// Streams `src` into `dst`, decrypting in CBC mode. PKCS7 padding is
/// stripped from the final block. A short or misaligned chunk stops the
/// stream with a warning rather than corrupting the output.
///
/// Fails only on cipher init (wrong key length) or a destination write
/// failure. Returns the number of plaintext bytes written.
pub fn decrypt_stream<R: Read, W: Write>(
    src: &mut R,
    dst: &mut W,
    key: &[u8],
    iv: &[u8; 16],
) -> Result<u64, GrabError> {
    let mut decryptor = Aes128CbcDec::new_from_slices(key, iv)
        .map_err(|e| GrabError::Decrypt(format!("failed to use the passed key: {e}")))?;

    let mut buf = vec![0u8; BUF_SIZE];
    let mut written: u64 = 0;
    // The most recent decrypted block is held back until we know whether it
    // ends the stream and carries the padding.
    let mut pending: Option<[u8; BLOCK]> = None;

    loop {
        let n = read_full(src, &mut buf)?;
        if n == 0 {
            if let Some(block) = pending.take() {
                let keep = BLOCK - padding_len(&block);
                dst.write_all(&block[..keep])
                    .map_err(|e| GrabError::Decrypt(format!("write failed: {e}")))?;
                written += keep as u64;
            }
            break;
        }
        if n < BLOCK || n % BLOCK != 0 {
            warn!(size = n, "unexpected chunk size in encrypted segment, stopping");
            if let Some(block) = pending.take() {
                dst.write_all(&block)
                    .map_err(|e| GrabError::Decrypt(format!("write failed: {e}")))?;
                written += BLOCK as u64;
            }
            break;
        }

        if let Some(block) = pending.take() {
            dst.write_all(&block)
                .map_err(|e| GrabError::Decrypt(format!("write failed: {e}")))?;
            written += BLOCK as u64;
        }

        for block in buf[..n].chunks_exact_mut(BLOCK) {
            decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        let mut last = [0u8; BLOCK];
        last.copy_from_slice(&buf[n - BLOCK..n]);
        pending = Some(last);

        dst.write_all(&buf[..n - BLOCK])
            .map_err(|e| GrabError::Decrypt(format!("write failed: {e}")))?;
        written += (n - BLOCK) as u64;
    }

    Ok(written)
}

/// Number of PKCS7 padding bytes in the final block, 0 when the tail is not
/// valid padding.
fn padding_len(block: &[u8; BLOCK]) -> usize {
    let pad = block[BLOCK - 1] as usize;
    if pad == 0 || pad > BLOCK {
        return 0;
    }
    if block[BLOCK - pad..].iter().all(|&b| b == pad as u8) {
        pad
    } else {
        0
    }
}

/// Reads until the buffer is full or the source is exhausted.
fn read_full<R: Read>(src: &mut R, buf: &mut [u8]) -> Result<usize, GrabError> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(GrabError::from(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipher::{BlockEncryptMut, block_padding::Pkcs7};

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    const KEY: [u8; 16] = *b"0123456789abcdef";

    fn encrypt(plain: &[u8], iv: &[u8; 16]) -> Vec<u8> {
        let mut buf = vec![0u8; plain.len() + BLOCK];
        let ct = Aes128CbcEnc::new(&KEY.into(), iv.into())
            .encrypt_padded_b2b_mut::<Pkcs7>(plain, &mut buf)
            .unwrap();
        ct.to_vec()
    }

    #[test]
    fn msn_iv_layout() {
        for pos in [0usize, 1, 4, 255, 70000] {
            let iv = msn_iv(pos);
            assert_eq!(&iv[..12], &[0u8; 12]);
            assert_eq!(
                u32::from_be_bytes(iv[12..].try_into().unwrap()),
                (pos as u32) + 1
            );
        }
    }

    #[test]
    fn round_trips_block_aligned_payload() {
        let iv = msn_iv(0);
        let plain: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        let ciphertext = encrypt(&plain, &iv);

        let mut out = Vec::new();
        let written =
            decrypt_stream(&mut ciphertext.as_slice(), &mut out, &KEY, &iv).unwrap();
        assert_eq!(out, plain);
        assert_eq!(written, plain.len() as u64);
    }

    #[test]
    fn round_trips_unaligned_plaintext() {
        let iv = msn_iv(3);
        let plain = b"not a multiple of sixteen bytes!!?".to_vec();
        let ciphertext = encrypt(&plain, &iv);

        let mut out = Vec::new();
        decrypt_stream(&mut ciphertext.as_slice(), &mut out, &KEY, &iv).unwrap();
        assert_eq!(out, plain);
    }

    #[test]
    fn misaligned_stream_stops_cleanly() {
        let iv = msn_iv(0);
        let mut ciphertext = encrypt(b"0123456789abcdef0123456789abcdef", &iv);
        ciphertext.truncate(ciphertext.len() - 5);

        let mut out = Vec::new();
        // No error: the warning path stops without corrupting what was
        // already produced.
        decrypt_stream(&mut ciphertext.as_slice(), &mut out, &KEY, &iv).unwrap();
        assert!(out.len() % BLOCK == 0);
    }

    #[test]
    fn wrong_key_length_fails_init() {
        let iv = msn_iv(0);
        let mut out = Vec::new();
        let err = decrypt_stream(&mut [0u8; 16].as_slice(), &mut out, b"short", &iv);
        assert!(matches!(err, Err(GrabError::Decrypt(_))));
    }
}
