use super::*;
use serde::Deserialize;
use serde_json::json;

struct BrokenBackend;

impl StorageBackend for BrokenBackend {
    fn read(&self, _key: &str) -> Result<Option<String>, StoreError> { Err(StoreError::Unavailable("disabled".into())) }
    fn write(&self, _key: &str, _value: &str) -> Result<(), StoreError> { Err(StoreError::Unavailable("disabled".into())) }
    fn delete(&self, _key: &str) -> Result<(), StoreError> { Err(StoreError::Unavailable("disabled".into())) }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Prefs {
    lang: String,
    page_size: u32,
}

#[test]
fn strings_are_stored_literally() {
    let store = TokenStore::in_memory();
    store.set_string(Tier::Session, "k", "plain text");
    assert_eq!(store.get_string(Tier::Session, "k").as_deref(), Some("plain text"));
    assert_eq!(store.get_string(Tier::Persistent, "k"), None);
}

#[test]
fn quoted_json_strings_are_unquoted() {
    let store = TokenStore::in_memory();
    store.set_structured(Tier::Session, "k", "abc");
    assert_eq!(store.get_string(Tier::Session, "k").as_deref(), Some("abc"));
}

#[test]
fn structured_values_decode_by_type() {
    let store = TokenStore::in_memory();
    let p = Prefs { lang: "th".into(), page_size: 50 };
    store.set_structured(Tier::Persistent, "prefs", &p);
    let back: Option<Prefs> = store.get_structured(Tier::Persistent, "prefs").unwrap();
    assert_eq!(back, Some(p));
}

#[test]
fn structured_decode_failure_is_typed() {
    let store = TokenStore::in_memory();
    store.set_string(Tier::Session, "prefs", "not json at all");
    let err = store.get_structured::<Prefs>(Tier::Session, "prefs").unwrap_err();
    assert!(matches!(err, StoreError::Decode { ref key, .. } if key == "prefs"));
    // Absent key is simply None.
    assert!(store.get_structured::<Prefs>(Tier::Session, "missing").unwrap().is_none());
}

#[test]
fn untyped_read_falls_back_to_raw_string() {
    let store = TokenStore::in_memory();
    store.set_string(Tier::Session, "a", "hello");
    store.set_structured(Tier::Session, "b", &json!({"x": 1}));
    assert_eq!(store.get_value(Tier::Session, "a"), Some(json!("hello")));
    assert_eq!(store.get_value(Tier::Session, "b"), Some(json!({"x": 1})));
}

#[test]
fn medium_failures_degrade_to_absent() {
    let store = TokenStore::new(Arc::new(BrokenBackend), Arc::new(MemoryBackend::new()));
    store.set_string(Tier::Session, "k", "v");
    assert_eq!(store.get_string(Tier::Session, "k"), None);
    assert!(store.get_structured::<Prefs>(Tier::Session, "k").unwrap().is_none());
    store.remove(Tier::Session, "k");
    // The other tier is unaffected.
    store.set_string(Tier::Persistent, "k", "v");
    assert_eq!(store.get_string(Tier::Persistent, "k").as_deref(), Some("v"));
}

#[test]
fn quota_exceeded_is_swallowed_and_keeps_old_value() {
    let store = TokenStore::new(Arc::new(MemoryBackend::with_quota(16)), Arc::new(MemoryBackend::new()));
    store.set_string(Tier::Session, "k", "short");
    store.set_string(Tier::Session, "k", "this value is far too long for the quota");
    assert_eq!(store.get_string(Tier::Session, "k").as_deref(), Some("short"));
}

#[test]
fn remove_everywhere_clears_both_tiers() {
    let store = TokenStore::in_memory();
    store.set_string(Tier::Session, "k", "a");
    store.set_string(Tier::Persistent, "k", "b");
    store.remove_everywhere("k");
    assert_eq!(store.get_string(Tier::Session, "k"), None);
    assert_eq!(store.get_string(Tier::Persistent, "k"), None);
}

#[test]
fn file_backend_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let store = TokenStore::with_dir(tmp.path()).unwrap();
        store.set_string(Tier::Persistent, "token", "abc.def.ghi");
        store.set_string(Tier::Session, "token", "session-only");
    }
    let store = TokenStore::with_dir(tmp.path()).unwrap();
    assert_eq!(store.get_string(Tier::Persistent, "token").as_deref(), Some("abc.def.ghi"));
    // Session tier does not survive.
    assert_eq!(store.get_string(Tier::Session, "token"), None);
}

#[test]
fn file_backend_ignores_corrupt_document() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("storage.json"), "{{{").unwrap();
    let fb = FileBackend::open(tmp.path()).unwrap();
    assert_eq!(fb.read("anything").unwrap(), None);
    fb.write("k", "v").unwrap();
    let reopened = FileBackend::open(tmp.path()).unwrap();
    assert_eq!(reopened.read("k").unwrap().as_deref(), Some("v"));
}

#[test]
fn failed_delete_keeps_the_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let fb = FileBackend::open(tmp.path()).unwrap();
    fb.write("token", "abc.def.ghi").unwrap();
    // the temp document path is occupied, so the flush cannot be written
    std::fs::create_dir(tmp.path().join("storage.json.tmp")).unwrap();
    assert!(fb.delete("token").is_err());
    assert_eq!(fb.read("token").unwrap().as_deref(), Some("abc.def.ghi"));

    std::fs::remove_dir(tmp.path().join("storage.json.tmp")).unwrap();
    fb.delete("token").unwrap();
    assert_eq!(fb.read("token").unwrap(), None);
    let reopened = FileBackend::open(tmp.path()).unwrap();
    assert_eq!(reopened.read("token").unwrap(), None);
}
