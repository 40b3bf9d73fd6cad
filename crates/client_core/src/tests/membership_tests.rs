use super::*;
use serde_json::json;

fn record(groups: Value) -> UserRecord {
    UserRecord {
        username: Some("alice".into()),
        first_name: Some("Alice".into()),
        middle_name: None,
        last_name: Some("Liddell".into()),
        groups: Some(groups),
    }
}

fn wire_groups(resolution: &Resolution) -> Vec<String> {
    resolution
        .user
        .groups
        .iter()
        .map(GroupRef::to_wire)
        .collect()
}

#[test]
fn duplicate_groups_collapse_in_first_seen_order() {
    let resolution = resolve("alice", record(json!(["Math::1", "Math::1", "Sci::2"])));
    assert_eq!(wire_groups(&resolution), vec!["Math::1", "Sci::2"]);
    assert!(resolution.malformed.is_empty());
}

#[test]
fn resolving_twice_yields_the_same_membership() {
    let first = resolve("alice", record(json!(["B::2", "A::1", "B::2", "A::1"])));
    let again = resolve(
        "alice",
        record(Value::Array(
            wire_groups(&first).into_iter().map(Value::String).collect(),
        )),
    );
    assert_eq!(first.user, again.user);
}

#[test]
fn missing_or_non_list_groups_resolve_to_empty() {
    let mut missing = record(json!([]));
    missing.groups = None;
    assert!(resolve("alice", missing).user.groups.is_empty());

    assert!(resolve("alice", record(json!("Math::1"))).user.groups.is_empty());
    assert!(resolve("alice", record(json!({"Math": 1}))).user.groups.is_empty());
    assert!(resolve("alice", record(Value::Null)).user.groups.is_empty());
}

#[test]
fn malformed_and_non_string_entries_are_set_aside() {
    let resolution = resolve("alice", record(json!(["Math::1", "Broken", 7, null, "Broken"])));
    assert_eq!(wire_groups(&resolution), vec!["Math::1"]);
    assert_eq!(
        resolution.malformed,
        vec![GroupRefError::MissingSeparator("Broken".into())]
    );
}

#[test]
fn names_default_and_username_falls_back_to_requested() {
    let resolution = resolve("alice", UserRecord::default());
    assert_eq!(resolution.user.username, "alice");
    assert_eq!(resolution.user.first_name, "");
    assert!(resolution.user.groups.is_empty());

    let resolution = resolve("alice", record(json!(["Team::42"])));
    assert_eq!(resolution.user.display_name(), "Alice Liddell");
    assert_eq!(resolution.user.groups[0].name, "Team");
}
