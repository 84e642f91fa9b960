use rand::Rng;

use railbook_shared::Pnr;

/// Draw a random PNR: ten decimal digits, never a leading zero, matching
/// the number format passengers know from their tickets.
pub fn random_pnr() -> Pnr {
    let n: u64 = rand::thread_rng().gen_range(1_000_000_000..10_000_000_000);
    Pnr::new(n.to_string()).expect("ten-digit range always forms a valid PNR")
}

/// Random generation with bounded regeneration on collision. Returns `None`
/// once `max_attempts` draws all came back taken; the caller surfaces that
/// as an internal error rather than looping forever.
pub fn generate_unique(max_attempts: u32, mut is_taken: impl FnMut(&Pnr) -> bool) -> Option<Pnr> {
    for _ in 0..max_attempts {
        let candidate = random_pnr();
        if !is_taken(&candidate) {
            return Some(candidate);
        }
    }
    None
}
