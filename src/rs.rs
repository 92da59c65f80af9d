//! Systematic Reed-Solomon codec over GF(2^8).
//!
//! Generator polynomial `x^8 + x^4 + x^3 + x^2 + 1` (0x11d), the same field
//! construction used by the upstream `creedsolo` codec this format was
//! originally built against. Encoding is classical systematic RS (message
//! bytes unchanged, parity symbols appended); decoding runs syndrome
//! computation, Berlekamp-Massey for the error-locator polynomial, Chien
//! search for its roots, and Forney's algorithm for error magnitudes.
//!
//! A codeword with more than `parity / 2` symbol errors cannot be corrected
//! and is reported as [`RsError::Uncorrectable`] rather than silently
//! returning wrong data.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RsError {
    #[error("message too long: {msg_len} + {parity} parity symbols exceeds 255")]
    TooLong { msg_len: usize, parity: usize },

    #[error("codeword shorter than parity length")]
    ShortCodeword,

    #[error("too many symbol errors to correct (more than {max_correctable} of {parity} parity symbols)")]
    Uncorrectable { parity: usize, max_correctable: usize },
}

const FIELD_SIZE: usize = 256;
const PRIM_POLY: u16 = 0x11d;

struct GaloisField {
    exp: [u8; FIELD_SIZE * 2],
    log: [u8; FIELD_SIZE],
}

impl GaloisField {
    fn new() -> Self {
        let mut exp = [0u8; FIELD_SIZE * 2];
        let mut log = [0u8; FIELD_SIZE];
        let mut x: u16 = 1;
        for i in 0..255usize {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= PRIM_POLY;
            }
        }
        for i in 255..FIELD_SIZE * 2 {
            exp[i] = exp[i - 255];
        }
        GaloisField { exp, log }
    }

    #[inline]
    fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            return 0;
        }
        let la = self.log[a as usize] as usize;
        let lb = self.log[b as usize] as usize;
        self.exp[la + lb]
    }

    #[inline]
    fn div(&self, a: u8, b: u8) -> u8 {
        assert!(b != 0, "division by zero in GF(2^8)");
        if a == 0 {
            return 0;
        }
        let la = self.log[a as usize] as usize;
        let lb = self.log[b as usize] as usize;
        self.exp[(la + 255 - lb) % 255]
    }

    #[inline]
    fn pow(&self, a: u8, power: i32) -> u8 {
        if a == 0 {
            return 0;
        }
        let la = self.log[a as usize] as i32;
        let e = (la * power).rem_euclid(255) as usize;
        self.exp[e]
    }

    #[inline]
    fn inverse(&self, a: u8) -> u8 {
        let la = self.log[a as usize] as usize;
        self.exp[255 - la]
    }

    fn poly_mul(&self, p: &[u8], q: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; p.len() + q.len() - 1];
        for (i, &pi) in p.iter().enumerate() {
            if pi == 0 {
                continue;
            }
            for (j, &qj) in q.iter().enumerate() {
                out[i + j] ^= self.mul(pi, qj);
            }
        }
        out
    }

    fn poly_eval(&self, p: &[u8], x: u8) -> u8 {
        let mut y = p[0];
        for &c in &p[1..] {
            y = self.mul(y, x) ^ c;
        }
        y
    }

    /// Divide `dividend` by `divisor`, returning only the remainder,
    /// padded to `divisor.len() - 1` bytes (the systematic-encode primitive).
    fn poly_div_remainder(&self, dividend: &[u8], divisor: &[u8]) -> Vec<u8> {
        let mut msg_out = dividend.to_vec();
        for i in 0..dividend.len().saturating_sub(divisor.len() - 1) {
            let coef = msg_out[i];
            if coef == 0 {
                continue;
            }
            for j in 1..divisor.len() {
                if divisor[j] != 0 {
                    msg_out[i + j] ^= self.mul(divisor[j], coef);
                }
            }
        }
        let split = dividend.len().saturating_sub(divisor.len() - 1);
        msg_out[split..].to_vec()
    }

    fn generator_poly(&self, parity: usize) -> Vec<u8> {
        let mut g = vec![1u8];
        for i in 0..parity {
            g = self.poly_mul(&g, &[1, self.pow(2, i as i32)]);
        }
        g
    }
}

thread_local! {
    static GF: GaloisField = GaloisField::new();
}

/// Encode `msg` with `parity` Reed-Solomon check symbols appended.
///
/// `msg.len() + parity` must not exceed 255 (GF(2^8) codeword limit).
pub fn encode(msg: &[u8], parity: usize) -> Result<Vec<u8>, RsError> {
    if msg.len() + parity > 255 {
        return Err(RsError::TooLong { msg_len: msg.len(), parity });
    }
    GF.with(|gf| {
        let generator = gf.generator_poly(parity);
        let mut padded = msg.to_vec();
        padded.extend(std::iter::repeat(0u8).take(parity));
        let remainder = gf.poly_div_remainder(&padded, &generator);
        let mut codeword = msg.to_vec();
        codeword.extend_from_slice(&remainder);
        Ok(codeword)
    })
}

/// Decode a codeword with `parity` trailing check symbols, correcting up to
/// `parity / 2` symbol errors. Returns the original message bytes.
pub fn decode(codeword: &[u8], parity: usize) -> Result<Vec<u8>, RsError> {
    if codeword.len() < parity {
        return Err(RsError::ShortCodeword);
    }
    GF.with(|gf| {
        let syndromes = compute_syndromes(gf, codeword, parity);
        if syndromes.iter().all(|&s| s == 0) {
            return Ok(codeword[..codeword.len() - parity].to_vec());
        }

        let err_loc = berlekamp_massey(gf, &syndromes, parity)?;
        let err_pos = chien_search(gf, &err_loc, codeword.len())?;

        let max_correctable = parity / 2;
        if err_pos.len() > max_correctable {
            return Err(RsError::Uncorrectable { parity, max_correctable });
        }

        let mut corrected = codeword.to_vec();
        forney_correct(gf, &mut corrected, &syndromes, &err_loc, &err_pos, parity);

        // Re-verify: a miscorrected codeword still has nonzero syndromes.
        let verify = compute_syndromes(gf, &corrected, parity);
        if !verify.iter().all(|&s| s == 0) {
            return Err(RsError::Uncorrectable { parity, max_correctable });
        }

        Ok(corrected[..corrected.len() - parity].to_vec())
    })
}

fn compute_syndromes(gf: &GaloisField, codeword: &[u8], parity: usize) -> Vec<u8> {
    (0..parity)
        .map(|i| gf.poly_eval(codeword, gf.pow(2, i as i32)))
        .collect()
}

/// Berlekamp-Massey: derive the error-locator polynomial from the syndromes.
fn berlekamp_massey(gf: &GaloisField, syndromes: &[u8], parity: usize) -> Result<Vec<u8>, RsError> {
    let mut err_loc = vec![1u8];
    let mut old_loc = vec![1u8];

    for i in 0..parity {
        old_loc.push(0);
        let mut delta = syndromes[i];
        for j in 1..err_loc.len() {
            delta ^= gf.mul(err_loc[err_loc.len() - 1 - j], syndromes[i - j]);
        }
        if delta != 0 {
            if old_loc.len() > err_loc.len() {
                let new_loc = gf.poly_mul(&old_loc, &[delta]);
                let scale = gf.inverse(*old_loc.last().unwrap_or(&1));
                old_loc = gf.poly_mul(&err_loc, &[gf.mul(delta, scale)]);
                err_loc = new_loc;
            } else {
                let correction = gf.poly_mul(&old_loc, &[delta]);
                err_loc = poly_add(&err_loc, &correction);
            }
        }
    }

    while err_loc.first() == Some(&0) {
        err_loc.remove(0);
    }
    let errs = err_loc.len() - 1;
    if errs * 2 > parity {
        return Err(RsError::Uncorrectable { parity, max_correctable: parity / 2 });
    }
    Ok(err_loc)
}

fn poly_add(p: &[u8], q: &[u8]) -> Vec<u8> {
    let len = p.len().max(q.len());
    let mut out = vec![0u8; len];
    for (i, &c) in p.iter().rev().enumerate() {
        out[len - 1 - i] ^= c;
    }
    for (i, &c) in q.iter().rev().enumerate() {
        out[len - 1 - i] ^= c;
    }
    out
}

/// Chien search: find the roots of the error-locator polynomial, i.e. the
/// codeword positions (counted from the end) that are in error.
fn chien_search(gf: &GaloisField, err_loc: &[u8], codeword_len: usize) -> Result<Vec<usize>, RsError> {
    let errs = err_loc.len() - 1;
    let mut positions = Vec::new();
    for i in 0..codeword_len {
        let x = gf.inverse(gf.pow(2, i as i32));
        if gf.poly_eval(err_loc, x) == 0 {
            positions.push(codeword_len - 1 - i);
        }
    }
    if positions.len() != errs {
        return Err(RsError::Uncorrectable { parity: 0, max_correctable: 0 });
    }
    Ok(positions)
}

/// Forney's algorithm: compute error magnitudes at the located positions and
/// XOR them into `codeword` in place.
fn forney_correct(
    gf: &GaloisField,
    codeword: &mut [u8],
    syndromes: &[u8],
    err_loc: &[u8],
    err_pos: &[usize],
    parity: usize,
) {
    let codeword_len = codeword.len();
    // Error evaluator polynomial: Omega(x) = [S(x) * Lambda(x)] mod x^parity
    let mut synd_rev: Vec<u8> = syndromes.to_vec();
    synd_rev.reverse();
    let full = gf.poly_mul(&synd_rev, err_loc);
    let start = full.len().saturating_sub(parity);
    let err_eval: Vec<u8> = full[start..].to_vec();

    let err_loc_prime_tmp: Vec<u8> = err_loc
        .iter()
        .rev()
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, &c)| c)
        .collect();

    for &pos in err_pos {
        let x_inv = gf.pow(2, (codeword_len - 1 - pos) as i32);
        let x_inv = gf.inverse(x_inv);

        let err_loc_prime = gf.poly_eval(&err_loc_prime_tmp, gf.mul(x_inv, x_inv));
        if err_loc_prime == 0 {
            continue;
        }
        let y = gf.poly_eval(&err_eval, x_inv);
        let y = gf.mul(gf.pow(x_inv, 1), y);
        let magnitude = gf.div(y, err_loc_prime);
        codeword[pos] ^= magnitude;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_no_errors() {
        let msg = b"the quick brown fox jumps over the lazy dog";
        let cw = encode(msg, 16).unwrap();
        let decoded = decode(&cw, 16).unwrap();
        assert_eq!(&decoded, msg);
    }

    #[test]
    fn corrects_up_to_half_parity_errors() {
        let msg: Vec<u8> = (0..200u32).map(|i| (i % 256) as u8).collect();
        let parity = 32;
        let mut cw = encode(&msg, parity).unwrap();
        for i in 0..(parity / 2) {
            cw[i * 5 % cw.len()] ^= 0xFF;
        }
        let decoded = decode(&cw, parity).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn reports_uncorrectable_beyond_limit() {
        let msg: Vec<u8> = (0..50u8).collect();
        let parity = 10;
        let mut cw = encode(&msg, parity).unwrap();
        for i in 0..parity + 1 {
            cw[i] ^= 0xFF;
        }
        let result = decode(&cw, parity);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_oversized_message() {
        let msg = vec![0u8; 250];
        assert!(encode(&msg, 10).is_err());
    }
}
