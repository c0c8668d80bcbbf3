//! Cursor and pagination property tests

use proptest::prelude::*;
use serde_json::json;

use RosterDesk::database::cursor::{decode, encode, ResumeKey, MAX_CURSOR_LENGTH};
use RosterDesk::database::engine::{IndexEntry, ItemKey, QueryRequest, QueryTarget, StorageEngine, StoredItem};
use RosterDesk::database::MemoryEngine;

fn key_part() -> impl Strategy<Value = String> {
    "[A-Za-z0-9#@._:-]{1,40}"
}

proptest! {
    #[test]
    fn resume_keys_survive_the_codec(pk in key_part(), sk in key_part(), ipk in key_part(), isk in key_part()) {
        let primary = ResumeKey::primary(pk.clone(), sk.clone());
        prop_assert_eq!(decode(&encode(&primary)).unwrap(), primary);

        let indexed = ResumeKey::indexed(pk, sk, ipk, isk);
        let cursor = encode(&indexed);
        prop_assert!(cursor.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        prop_assert_eq!(decode(&cursor).unwrap(), indexed);
    }

    #[test]
    fn decode_never_panics(input in ".{0,300}") {
        let _ = decode(&input);
    }

    #[test]
    fn oversized_cursors_are_rejected(extra in 1usize..64) {
        let cursor = "A".repeat(MAX_CURSOR_LENGTH + extra);
        prop_assert!(decode(&cursor).is_err());
    }

    #[test]
    fn partition_pages_cover_every_item_once(count in 0usize..40, limit in 1usize..12) {
        tokio_test::block_on(async {
            let engine = MemoryEngine::new();
            for i in 0..count {
                engine
                    .put_if_absent(StoredItem {
                        key: ItemKey::new("EVENT#1", format!("REGISTRATION#{i:03}@example.com")),
                        version: 1,
                        body: json!({ "n": i }),
                        index: None,
                    })
                    .await
                    .unwrap();
            }
            // Neighbours that must never show up
            engine
                .put_if_absent(StoredItem {
                    key: ItemKey::new("EVENT#1", "METADATA"),
                    version: 1,
                    body: json!({}),
                    index: Some(IndexEntry::new("EVENTS", "2030")),
                })
                .await
                .unwrap();
            engine
                .put_if_absent(StoredItem {
                    key: ItemKey::new("EVENT#2", "REGISTRATION#zed@example.com"),
                    version: 1,
                    body: json!({}),
                    index: None,
                })
                .await
                .unwrap();

            let target = QueryTarget::Partition {
                pk: "EVENT#1".to_string(),
                sk_prefix: "REGISTRATION#".to_string(),
            };
            let mut seen = Vec::new();
            let mut cursor: Option<String> = None;
            loop {
                let resume = cursor.as_deref().map(decode).transpose().unwrap();
                let page = engine.query(QueryRequest::new(target.clone(), limit, resume)).await.unwrap();
                assert!(page.items.len() <= limit);
                seen.extend(page.items.into_iter().map(|item| item.key.sk));
                match page.next_cursor {
                    Some(next) => {
                        assert!(page.has_more);
                        cursor = Some(encode(&next));
                    }
                    None => {
                        assert!(!page.has_more);
                        break;
                    }
                }
            }

            let expected: Vec<String> = (0..count).map(|i| format!("REGISTRATION#{i:03}@example.com")).collect();
            assert_eq!(seen, expected);
        });
    }
}

#[test]
fn test_tampered_cursors_are_rejected() {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let forged = [
        json!({ "pk": "EVENT#1" }),
        json!({ "pk": "EVENT#1", "sk": "" }),
        json!({ "pk": "EVENT#1", "sk": "METADATA", "index_pk": "EVENTS" }),
        json!({ "pk": "EVENT#1", "sk": "METADATA", "owner": "admin" }),
        json!({ "pk": 1, "sk": "METADATA" }),
        json!(["EVENT#1", "METADATA"]),
    ];

    for value in forged {
        let cursor = URL_SAFE_NO_PAD.encode(value.to_string());
        assert!(decode(&cursor).is_err(), "{value} should not decode");
    }
    assert!(decode("").is_err());
    assert!(decode("bm90IGpzb24").is_err());
}
