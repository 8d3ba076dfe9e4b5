//! Order code generation.

use rand::Rng;
use uuid::Uuid;

use crate::models::order::CODE_ALPHABET;
use crate::store::EventStore;

pub const GENERATED_CODE_LEN: usize = 5;

fn random_code(len: usize) -> String {
    let alphabet = CODE_ALPHABET.as_bytes();
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Draws codes until one is free within the organizer's namespace. Must be
/// called inside the event lock so the uniqueness check stays valid until
/// the order is committed.
pub fn generate_order_code(store: &EventStore, organizer_id: Uuid) -> String {
    loop {
        let code = random_code(GENERATED_CODE_LEN);
        if !store.order_code_exists(organizer_id, &code) {
            return code;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::is_valid_code;

    #[test]
    fn generated_codes_are_valid_order_codes() {
        let store = EventStore::new();
        let organizer_id = Uuid::new_v4();
        for _ in 0..100 {
            let code = generate_order_code(&store, organizer_id);
            assert_eq!(code.len(), GENERATED_CODE_LEN);
            assert!(is_valid_code(&code), "invalid code generated: {code}");
        }
    }
}
