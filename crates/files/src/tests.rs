//! Workflow tests for the files crate.

#[cfg(test)]
mod workflow_tests {
    use crate::*;
    use std::sync::Arc;

    fn id(raw: &str) -> Identity {
        Identity::new(raw).unwrap()
    }

    fn upload(name: &str, content: &[u8], fingerprint: u64) -> UploadRequest {
        UploadRequest {
            name: name.to_string(),
            content: content.to_vec(),
            media_type: "image/png".to_string(),
            fingerprint: Fingerprint::from_u64(fingerprint),
        }
    }

    fn registry_with(retention: RetentionPolicy) -> FileRegistry {
        let config = RegistryConfig {
            retention,
            ..RegistryConfig::default()
        };
        FileRegistry::new(Arc::new(MemoryRegistryStore::new()), config).unwrap()
    }

    #[test]
    fn test_logo_scenario() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");
        let bob = id("bob");

        let first = registry
            .upload_file(&alice, upload("logo.png", &[1, 2, 3], u64::MAX))
            .unwrap();
        assert!(first.is_committed());

        let second = registry
            .upload_file(&bob, upload("copy.png", &[1, 2, 3], u64::MAX))
            .unwrap();
        assert!(matches!(second, UploadOutcome::Rejected { .. }));
        assert!(!registry.check_file_exists(&bob, "copy.png").unwrap());

        let matches = registry
            .find_similar(Fingerprint::from_u64(0xFFFF_FFFF_FFFF_FFFE), None)
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].name, "logo.png");
        assert_eq!(matches[0].owner, alice);
        assert_eq!(matches[0].similarity, 98);
    }

    #[test]
    fn test_duplicate_rejection_keeps_original_owner() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");
        let bob = id("bob");
        let content = b"shared bytes";

        registry.upload_file(&alice, upload("x", content, 0)).unwrap();
        let outcome = registry.upload_file(&bob, upload("x", content, 0)).unwrap();

        let hash = ContentHash::from_data(content);
        assert_eq!(outcome, UploadOutcome::Rejected { content_hash: hash });

        let verification = registry.verify_file_by_hash(&hash).unwrap().unwrap();
        assert_eq!(verification.owner, alice);
        assert!(registry.get_files(&bob).unwrap().is_empty());
        assert!(registry.get_alerts(&bob).unwrap().is_empty());
    }

    #[test]
    fn test_same_owner_overwrite() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");

        registry.upload_file(&alice, upload("x", b"version one", 0)).unwrap();
        registry.upload_file(&alice, upload("x", b"version two", 0)).unwrap();

        let files = registry.get_files(&alice).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "x");
        assert_eq!(files[0].content_hash, ContentHash::from_data(b"version two"));

        let record = registry.get_file_content(&alice, "x").unwrap().unwrap();
        assert_eq!(record.content(), b"version two");
    }

    #[test]
    fn test_same_content_same_name_is_idempotent() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");

        let first = registry.upload_file(&alice, upload("x", b"bytes", 0)).unwrap();
        let second = registry.upload_file(&alice, upload("x", b"bytes", 0)).unwrap();

        assert!(matches!(
            first,
            UploadOutcome::Committed { newly_registered: true, .. }
        ));
        assert!(matches!(
            second,
            UploadOutcome::Committed { newly_registered: false, .. }
        ));
        assert_eq!(registry.get_files(&alice).unwrap().len(), 1);
        assert_eq!(registry.registry_len().unwrap(), 1);
    }

    #[test]
    fn test_same_content_different_names_keeps_first_registration() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");

        registry.upload_file(&alice, upload("first.png", b"bytes", 0)).unwrap();
        registry.upload_file(&alice, upload("second.png", b"bytes", 0)).unwrap();

        assert_eq!(registry.get_files(&alice).unwrap().len(), 2);
        assert_eq!(registry.registry_len().unwrap(), 1);

        let verification = registry
            .verify_file_by_hash(&ContentHash::from_data(b"bytes"))
            .unwrap()
            .unwrap();
        assert_eq!(verification.name, "first.png");
    }

    #[test]
    fn test_verify_unknown_hash() {
        let registry = FileRegistry::in_memory();
        let unused = ContentHash::from_data(b"never uploaded");
        assert!(registry.verify_file_by_hash(&unused).unwrap().is_none());
    }

    #[test]
    fn test_similarity_threshold_boundary() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");

        registry
            .upload_file(&alice, upload("six.png", b"six", 0b11_1111))
            .unwrap();
        registry
            .upload_file(&alice, upload("seven.png", b"seven", 0b111_1111))
            .unwrap();

        let matches = registry.find_similar(Fingerprint::from_u64(0), None).unwrap();
        let names: Vec<&str> = matches.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["six.png"]);
        assert_eq!(matches[0].similarity, 90);

        let loose = registry
            .find_similar(Fingerprint::from_u64(0), Some(89))
            .unwrap();
        assert_eq!(loose.len(), 2);

        assert!(matches!(
            registry.find_similar(Fingerprint::from_u64(0), Some(101)),
            Err(RegistryError::InvalidThreshold(101))
        ));
    }

    #[test]
    fn test_alerts_after_upload() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");

        registry.upload_file(&alice, upload("a.png", b"a", 0)).unwrap();
        registry.send_dummy_notification(&alice).unwrap();

        let alerts = registry.get_alerts(&alice).unwrap();
        assert_eq!(
            alerts,
            vec![
                "Upload succeeded: a.png".to_string(),
                "View details for a.png in your catalog".to_string(),
                DUMMY_NOTIFICATION.to_string(),
            ]
        );
        // Reading does not consume.
        assert_eq!(registry.get_alerts(&alice).unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_input_rejected_before_mutation() {
        let config = RegistryConfig {
            max_file_size_bytes: 8,
            ..RegistryConfig::default()
        };
        let registry = FileRegistry::new(Arc::new(MemoryRegistryStore::new()), config).unwrap();
        let alice = id("alice");

        let cases = [
            upload("", b"data", 0),
            upload("line\nbreak", b"data", 0),
            upload(&"n".repeat(MAX_NAME_LEN + 1), b"data", 0),
            upload("empty", b"", 0),
            upload("large", b"more than eight", 0),
            UploadRequest {
                media_type: "m".repeat(MAX_MEDIA_TYPE_LEN + 1),
                ..upload("media", b"data", 0)
            },
        ];
        for request in cases {
            let err = registry.upload_file(&alice, request).unwrap_err();
            assert!(err.is_invalid_input(), "unexpected error kind: {err}");
        }

        assert_eq!(registry.registry_len().unwrap(), 0);
        assert!(registry.get_alerts(&alice).unwrap().is_empty());
    }

    #[test]
    fn test_delete_keeps_claim_under_permanent_policy() {
        let registry = registry_with(RetentionPolicy::Permanent);
        let alice = id("alice");
        let bob = id("bob");

        registry.upload_file(&alice, upload("x", b"claimed", 0)).unwrap();
        assert!(registry.delete_file(&alice, "x").unwrap());
        assert!(!registry.delete_file(&alice, "x").unwrap());
        assert!(!registry.check_file_exists(&alice, "x").unwrap());

        let outcome = registry.upload_file(&bob, upload("y", b"claimed", 0)).unwrap();
        assert!(!outcome.is_committed());
        assert_eq!(registry.registry_len().unwrap(), 1);
    }

    #[test]
    fn test_delete_releases_orphan_under_reclaim_policy() {
        let registry = registry_with(RetentionPolicy::ReclaimOrphans);
        let alice = id("alice");
        let bob = id("bob");

        registry.upload_file(&alice, upload("a", b"claimed", 0)).unwrap();
        registry.upload_file(&alice, upload("b", b"claimed", 0)).unwrap();

        // Still referenced by "b".
        registry.delete_file(&alice, "a").unwrap();
        assert_eq!(registry.registry_len().unwrap(), 1);

        registry.delete_file(&alice, "b").unwrap();
        assert_eq!(registry.registry_len().unwrap(), 0);

        let outcome = registry.upload_file(&bob, upload("mine", b"claimed", 0)).unwrap();
        assert!(outcome.is_committed());
        let verification = registry
            .verify_file_by_hash(&ContentHash::from_data(b"claimed"))
            .unwrap()
            .unwrap();
        assert_eq!(verification.owner, bob);
    }

    #[test]
    fn test_overwrite_releases_replaced_content_under_reclaim_policy() {
        let registry = registry_with(RetentionPolicy::ReclaimOrphans);
        let alice = id("alice");

        registry.upload_file(&alice, upload("x", b"old", 0)).unwrap();
        registry.upload_file(&alice, upload("x", b"new", 0)).unwrap();

        assert!(registry
            .verify_file_by_hash(&ContentHash::from_data(b"old"))
            .unwrap()
            .is_none());
        assert_eq!(registry.registry_len().unwrap(), 1);
    }

    #[test]
    fn test_deleting_non_owned_content_never_releases_claim() {
        let registry = registry_with(RetentionPolicy::ReclaimOrphans);
        let alice = id("alice");
        let bob = id("bob");

        registry.upload_file(&alice, upload("a", b"alice's", 0)).unwrap();
        registry.upload_file(&bob, upload("b", b"bob's", 0)).unwrap();

        assert!(!registry.delete_file(&bob, "a").unwrap());
        assert_eq!(registry.registry_len().unwrap(), 2);
    }

    #[test]
    fn test_get_file_content_is_owner_scoped() {
        let registry = FileRegistry::in_memory();
        let alice = id("alice");
        let bob = id("bob");

        registry.upload_file(&alice, upload("secret", b"payload", 0)).unwrap();
        assert!(registry.get_file_content(&bob, "secret").unwrap().is_none());
        assert_eq!(
            registry
                .get_file_content(&alice, "secret")
                .unwrap()
                .unwrap()
                .media_type(),
            "image/png"
        );
    }

    #[test]
    fn test_concurrent_uploads_commit_exactly_once() {
        const CALLERS: usize = 16;
        let registry = FileRegistry::in_memory();

        let outcomes: Vec<UploadOutcome> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..CALLERS)
                .map(|i| {
                    let registry = &registry;
                    scope.spawn(move || {
                        let caller = id(&format!("caller-{i}"));
                        registry
                            .upload_file(&caller, upload("race.bin", b"contested", 0))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let committed = outcomes.iter().filter(|o| o.is_committed()).count();
        assert_eq!(committed, 1);
        assert_eq!(outcomes.len() - committed, CALLERS - 1);
        assert_eq!(registry.registry_len().unwrap(), 1);
    }
}
