//! Black-box tests for the directory/file adapter over the core index.

mod common;

use common::Rng;
use dc::index::IndexFile;
use dc::object::{ObjectKind, ObjectStore};
use std::collections::HashMap;
use tempfile::NamedTempFile;

fn new_index() -> (NamedTempFile, IndexFile) {
    let file = NamedTempFile::new().unwrap();
    let index = IndexFile::create_file_system_with_capacity(file.path(), 4096, 64).unwrap();
    (file, index)
}

#[test]
fn nested_directories_and_files() {
    let (_file, index) = new_index();
    let objects = ObjectStore::new(&index);
    objects.create_root_directory().unwrap();

    let home = objects
        .add_directory(ObjectStore::ROOT_INODE, "home")
        .unwrap()
        .unwrap();
    let docs = objects.add_directory(home, "docs").unwrap().unwrap();
    let note = objects.add_file(docs, "note.txt").unwrap().unwrap();

    objects.write_file(note, b"hello", 0).unwrap();
    objects.append_file(note, b" world").unwrap();
    assert_eq!(objects.read_file(note).unwrap(), b"hello world");

    let root_entries = objects.list_directory(ObjectStore::ROOT_INODE).unwrap();
    assert_eq!(root_entries.len(), 1);
    assert_eq!(root_entries[0].kind, ObjectKind::Directory);

    let found = objects.lookup_in_directory(docs, "note.txt").unwrap();
    assert_eq!(found, Some(note));
}

#[test]
fn removed_entries_disappear_from_listing() {
    let (_file, index) = new_index();
    let objects = ObjectStore::new(&index);
    objects.create_root_directory().unwrap();

    let a = objects.add_file(ObjectStore::ROOT_INODE, "a").unwrap().unwrap();
    let _b = objects.add_file(ObjectStore::ROOT_INODE, "b").unwrap().unwrap();

    objects.remove_object(a, ObjectStore::ROOT_INODE).unwrap();

    let entries = objects.list_directory(ObjectStore::ROOT_INODE).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "b");
}

#[test]
fn add_object_under_missing_parent_returns_none() {
    let (_file, index) = new_index();
    let objects = ObjectStore::new(&index);
    objects.create_root_directory().unwrap();
    assert_eq!(objects.add_file(9999, "orphan").unwrap(), None);
}

/// Property-style coverage of the object layer (SPEC_FULL §8, "the object
/// layer" property tests): a random sequence of creates and removes under
/// the root directory, checked against a `HashMap` model after every step,
/// across many random seeds rather than one fixed script.
#[test]
fn property_random_directory_contents_match_model() {
    for seed in 0..20u64 {
        let mut rng = Rng::new(seed.wrapping_mul(6_364_136_223).wrapping_add(5));
        let (_file, index) = new_index();
        let objects = ObjectStore::new(&index);
        objects.create_root_directory().unwrap();

        let mut model: HashMap<String, (u64, ObjectKind)> = HashMap::new();
        let op_count = rng.below(40);

        for step in 0..op_count {
            let name = format!("entry-{}", rng.below(12));
            match rng.below(3) {
                0 => {
                    let created = objects.add_file(ObjectStore::ROOT_INODE, &name).unwrap();
                    if model.contains_key(&name) {
                        assert_eq!(created, None, "re-adding existing name {} should fail", name);
                    } else if let Some(key) = created {
                        model.insert(name.clone(), (key, ObjectKind::File));
                    }
                }
                1 => {
                    let created = objects.add_directory(ObjectStore::ROOT_INODE, &name).unwrap();
                    if model.contains_key(&name) {
                        assert_eq!(created, None, "re-adding existing name {} should fail", name);
                    } else if let Some(key) = created {
                        model.insert(name.clone(), (key, ObjectKind::Directory));
                    }
                }
                _ => {
                    if let Some((key, _)) = model.remove(&name) {
                        objects.remove_object(key, ObjectStore::ROOT_INODE).unwrap();
                    }
                }
            }

            // After every step, the listing matches the model exactly and
            // lookup-by-name agrees with it, keyed by step for an
            // informative failure message.
            let mut listed: HashMap<String, (u64, ObjectKind)> = objects
                .list_directory(ObjectStore::ROOT_INODE)
                .unwrap()
                .into_iter()
                .map(|e| (e.name, (e.inode, e.kind)))
                .collect();
            let mut expected = model.clone();
            for (name, entry) in expected.drain() {
                let actual = listed.remove(&name);
                assert_eq!(actual, Some(entry), "step {}: listing mismatch for {}", step, name);
            }
            assert!(listed.is_empty(), "step {}: unexpected extra entries {:?}", step, listed);

            for (name, &(key, _)) in &model {
                assert_eq!(
                    objects.lookup_in_directory(ObjectStore::ROOT_INODE, name).unwrap(),
                    Some(key),
                    "step {}: lookup_in_directory disagrees with model for {}",
                    step,
                    name
                );
            }
        }

        common::assert_no_leaks_and_balanced(&index);
    }
}
