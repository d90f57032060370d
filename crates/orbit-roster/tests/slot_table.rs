//! Slot table behaviour over a long run of joins and leaves.

use orbit_roster::{Player, PlayerNumber, PlayerRegistry, RosterError};
use orbit_protocol::Bytes;

fn admit(registry: &mut PlayerRegistry, name: &str) -> Option<PlayerNumber> {
    let number = registry.lowest_free()?;
    let name = registry.unique_name(name, number);
    registry
        .insert(Player::new(number, name, Bytes::new()))
        .map(|player| player.number)
        .ok()
}

fn assert_consistent(registry: &PlayerRegistry) {
    assert_eq!(registry.iter().count(), registry.len());
    assert!(registry.len() <= registry.max_players());
    assert_eq!(registry.is_full(), registry.lowest_free().is_none());
    let numbers: Vec<_> = registry.numbers().collect();
    let mut sorted = numbers.clone();
    sorted.sort();
    assert_eq!(numbers, sorted);
}

#[test]
fn test_churn_keeps_count_and_slots_consistent() {
    let mut registry = PlayerRegistry::new(6);
    // A fixed pseudo-random walk of joins (true) and leaves (false).
    let mut seed: u32 = 0x2545_f491;
    for step in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        if seed % 3 != 0 {
            let before = registry.len();
            match admit(&mut registry, "pilot") {
                Some(number) => {
                    assert_eq!(registry.len(), before + 1);
                    assert!(number.index() < 6);
                }
                None => assert!(registry.is_full(), "step {step}"),
            }
        } else {
            let picked = registry.numbers().nth(seed as usize % registry.len().max(1));
            if let Some(number) = picked {
                assert!(registry.remove(number).is_some());
            }
        }
        assert_consistent(&registry);
    }
}

#[test]
fn test_numbers_stay_put_while_others_come_and_go() {
    let mut registry = PlayerRegistry::new(4);
    let a = admit(&mut registry, "a").unwrap();
    let b = admit(&mut registry, "b").unwrap();
    let c = admit(&mut registry, "c").unwrap();

    registry.remove(b);
    let d = admit(&mut registry, "d").unwrap();
    assert_eq!(d, b);
    assert_eq!(registry.get(a).unwrap().name, "a");
    assert_eq!(registry.get(c).unwrap().name, "c");
    assert_eq!(registry.get(d).unwrap().name, "d");
}

#[test]
fn test_duplicate_names_get_distinct_suffixes() {
    let mut registry = PlayerRegistry::new(4);
    for _ in 0..3 {
        admit(&mut registry, "Nova").unwrap();
    }
    let names: Vec<&str> = registry.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, ["Nova", "Nova1", "Nova2"]);
}

#[test]
fn test_insert_into_mirror_rejects_bad_roster_entries() {
    let mut mirror = PlayerRegistry::new(2);
    mirror
        .insert(Player::new(PlayerNumber(1), "Vega", Bytes::new()))
        .unwrap();

    assert_eq!(
        mirror
            .insert(Player::new(PlayerNumber(1), "Nova", Bytes::new()))
            .unwrap_err(),
        RosterError::SlotOccupied(PlayerNumber(1))
    );
    assert_eq!(
        mirror
            .insert(Player::new(PlayerNumber(2), "Nova", Bytes::new()))
            .unwrap_err(),
        RosterError::SlotOutOfRange {
            number: PlayerNumber(2),
            max_players: 2,
        }
    );
    assert_eq!(mirror.len(), 1);
}
