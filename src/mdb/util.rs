use nom::combinator::all_consuming;
use nom::IResult;
use snafu::ensure;

use super::{DecodeError, InvalidBcdSnafu, InvalidTextSnafu, LengthMismatchSnafu, MalformedSnafu};

/// Check the length of `bytes`, then run `parser` over all of it.
pub(crate) fn parse_fixed<'a, O, F>(
    bytes: &'a [u8],
    record: &'static str,
    expected: usize,
    parser: F,
) -> Result<O, DecodeError>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], O>,
{
    ensure_len(bytes, record, expected)?;
    let (_, out) = all_consuming(parser)(bytes).map_err(|_| MalformedSnafu { record }.build())?;
    Ok(out)
}

pub(crate) fn ensure_len(
    bytes: &[u8],
    record: &'static str,
    expected: usize,
) -> Result<(), DecodeError> {
    ensure!(
        bytes.len() == expected,
        LengthMismatchSnafu {
            record,
            expected,
            actual: bytes.len(),
        }
    );
    Ok(())
}

/// Read packed BCD, two decimal digits per byte, most significant first.
pub(crate) fn bcd(bytes: &[u8]) -> Option<u32> {
    bytes.iter().try_fold(0u32, |acc, byte| {
        let (hi, lo) = (u32::from(byte >> 4), u32::from(byte & 0x0F));
        if hi > 9 || lo > 9 {
            None
        } else {
            Some(acc * 100 + hi * 10 + lo)
        }
    })
}

pub(crate) fn bcd_field(bytes: &[u8], field: &'static str) -> Result<u32, DecodeError> {
    bcd(bytes).ok_or_else(|| InvalidBcdSnafu { field }.build())
}

/// Expand a 16 bit word into its bits, most significant bit first.
pub(crate) fn bits16(word: u16) -> [bool; 16] {
    let mut bits = [false; 16];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = word & (0x8000 >> i) != 0;
    }
    bits
}

/// Read `N` big-endian 16 bit words.
pub(crate) fn words<const N: usize>(bytes: &[u8]) -> [u16; N] {
    let mut out = [0; N];
    for (word, chunk) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = u16::from_be_bytes([chunk[0], chunk[1]]);
    }
    out
}

/// ASCII text field, trailing space padding removed.
pub(crate) fn ascii(bytes: &[u8], field: &'static str) -> Result<String, DecodeError> {
    ensure!(
        bytes
            .iter()
            .all(|b| (b.is_ascii() && !b.is_ascii_control()) || *b == 0),
        InvalidTextSnafu { field }
    );
    let text: String = bytes.iter().map(|&b| char::from(b)).collect();
    Ok(text.trim_end_matches(|c: char| c == ' ' || c == '\0').to_string())
}
