use proptest::prelude::*;
use socialite_types::EntityId;
use std::collections::HashSet;
use std::str::FromStr;

// ── Construction ──────────────────────────────────────────────────

#[test]
fn entity_id_equal_iff_strings_equal() {
    let a = EntityId::new("100001");
    let b = EntityId::new(String::from("100001"));
    let c = EntityId::new("100002");
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn entity_id_is_interned() {
    let a = EntityId::new("p_interned");
    let b = EntityId::new(format!("p_{}", "interned"));
    assert!(a.ptr_eq(&b));
}

#[test]
fn local_ids_stay_out_of_the_pool() {
    let minted = EntityId::synthesize();
    let copy = EntityId::new(minted.as_str());
    assert_eq!(minted, copy);
    assert!(!minted.ptr_eq(&copy));
    assert!(copy.is_local());
}

#[test]
fn entity_id_default_is_invalid() {
    let id = EntityId::default();
    assert!(!id.is_valid());
    assert_eq!(id, EntityId::invalid());
    assert_eq!(id.as_str(), "");
}

#[test]
fn entity_id_from_empty_string_is_invalid() {
    assert!(!EntityId::new("").is_valid());
}

#[test]
fn entity_id_server_key_is_valid_and_not_local() {
    let id = EntityId::new("12345_678");
    assert!(id.is_valid());
    assert!(!id.is_local());
}

#[test]
fn synthesized_ids_are_unique_and_local() {
    let a = EntityId::synthesize();
    let b = EntityId::synthesize();
    assert_ne!(a, b);
    assert!(a.is_valid());
    assert!(a.is_local());
}

// ── Parsing ───────────────────────────────────────────────────────

#[test]
fn entity_id_parse_rejects_empty() {
    assert!(EntityId::parse("").is_err());
    assert!(EntityId::from_str("").is_err());
}

#[test]
fn entity_id_display_and_parse() {
    let id = EntityId::new("abc");
    let parsed = EntityId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entity_id_debug_contains_name() {
    let debug = format!("{:?}", EntityId::new("xyz"));
    assert!(debug.contains("EntityId"));
    assert!(debug.contains("xyz"));
}

// ── Hashing & ordering ────────────────────────────────────────────

#[test]
fn entity_id_hash_and_eq() {
    let mut set = HashSet::new();
    set.insert(EntityId::new("dup"));
    set.insert(EntityId::new("dup"));
    assert_eq!(set.len(), 1);
}

#[test]
fn entity_id_orders_by_string() {
    let mut ids = vec![EntityId::new("b"), EntityId::new("c"), EntityId::new("a")];
    ids.sort();
    let strs: Vec<&str> = ids.iter().map(EntityId::as_str).collect();
    assert_eq!(strs, vec!["a", "b", "c"]);
}

// ── Serde ─────────────────────────────────────────────────────────

#[test]
fn entity_id_serializes_as_plain_string() {
    let json = serde_json::to_string(&EntityId::new("777")).unwrap();
    assert_eq!(json, "\"777\"");
}

#[test]
fn entity_id_deserializes_empty_as_invalid() {
    let id: EntityId = serde_json::from_str("\"\"").unwrap();
    assert!(!id.is_valid());
}

proptest! {
    #[test]
    fn equality_matches_string_equality(a in "[a-z0-9_]{0,12}", b in "[a-z0-9_]{0,12}") {
        prop_assert_eq!(EntityId::new(&a) == EntityId::new(&b), a == b);
    }

    #[test]
    fn serde_preserves_value(s in "[a-z0-9_]{1,20}") {
        let id = EntityId::new(&s);
        let json = serde_json::to_string(&id).unwrap();
        let back: EntityId = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(id, back);
    }
}
