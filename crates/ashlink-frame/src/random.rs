//! DATA field randomization.
//!
//! DATA fields are XORed with a pseudo-random sequence before transmission
//! so that long runs of reserved bytes do not double the frame size through
//! escaping. Applying the same operation again restores the original bytes.

const SEED: u8 = 0x42;

/// XOR `data` in place with the randomization sequence.
pub fn randomize(data: &mut [u8]) {
    let mut rand = SEED;
    for byte in data {
        *byte ^= rand;
        rand = if rand & 1 == 1 {
            (rand >> 1) ^ 0xB8
        } else {
            rand >> 1
        };
    }
}
