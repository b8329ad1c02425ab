//! Integration tests for tree mutations through [`FileTree`].
//!
//! Each test builds its own store in a temp directory, so tests can run in
//! parallel safely.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use common::{OWNER, TestTree, next_message};
use treestore::error::Error;
use treestore::store::Store;
use treestore::types::{NodeKind, PendingFile, PrivilegeLevel, PublicAccessLevel};

const EDITOR: &str = "editor-1";
const READER: &str = "reader-1";

#[tokio::test]
async fn renaming_folder_rewrites_descendant_paths() {
    let t = TestTree::new();
    let project = t.project("thesis");
    let root = t.root_id(&project.id);

    let figures = t.tree.add_folder(&project.id, OWNER, &root, "figures").unwrap();
    let after_folder = t.tree_version(&project.id);

    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &figures.id, "fig1.tex", "")
        .unwrap();
    assert_eq!(doc.path, "/figures/fig1.tex");

    let renamed = t
        .tree
        .rename_entity(&project.id, OWNER, NodeKind::Folder, &figures.id, "images")
        .unwrap();
    assert_eq!(renamed.old_path, "/figures/");
    assert_eq!(renamed.path, "/images/");

    let entry = t
        .tree
        .find_entry_by_path(&project.id, Some(OWNER), None, "/images/fig1.tex")
        .unwrap();
    assert_eq!(entry.header.id, doc.id);

    assert_eq!(t.tree_version(&project.id), after_folder + 2);
    assert_eq!(t.tree_version(&project.id), project.tree_version + 3);
}

#[tokio::test]
async fn moving_folder_keeps_path_tails() {
    let t = TestTree::new();
    let project = t.project("book");
    let root = t.root_id(&project.id);

    let chapters = t.tree.add_folder(&project.id, OWNER, &root, "chapters").unwrap();
    let part1 = t.tree.add_folder(&project.id, OWNER, &chapters.id, "part1").unwrap();
    t.tree
        .create_doc(&project.id, OWNER, &part1.id, "intro.tex", "")
        .unwrap();
    t.tree
        .create_doc(&project.id, OWNER, &chapters.id, "outline.tex", "")
        .unwrap();
    let archive = t.tree.add_folder(&project.id, OWNER, &root, "archive").unwrap();

    let moved = t
        .tree
        .move_entity(&project.id, OWNER, NodeKind::Folder, &chapters.id, &archive.id)
        .unwrap();
    assert_eq!(moved.path, "/archive/chapters/");

    let paths: Vec<String> = t
        .tree
        .get_project_tree(&project.id, Some(OWNER), None)
        .unwrap()
        .into_iter()
        .map(|e| e.header.path)
        .collect();

    for expected in [
        "/archive/chapters/",
        "/archive/chapters/part1/",
        "/archive/chapters/part1/intro.tex",
        "/archive/chapters/outline.tex",
    ] {
        assert!(paths.iter().any(|p| p == expected), "missing {expected}");
    }
    assert!(!paths.iter().any(|p| p.starts_with("/chapters/")));
}

#[tokio::test]
async fn folder_cannot_move_into_itself_or_descendant() {
    let t = TestTree::new();
    let project = t.project("cycles");
    let root = t.root_id(&project.id);

    let a = t.tree.add_folder(&project.id, OWNER, &root, "a").unwrap();
    let b = t.tree.add_folder(&project.id, OWNER, &a.id, "b").unwrap();
    let c = t.tree.add_folder(&project.id, OWNER, &b.id, "c").unwrap();
    let before = t.tree_version(&project.id);

    for target in [&a.id, &b.id, &c.id] {
        let result = t
            .tree
            .move_entity(&project.id, OWNER, NodeKind::Folder, &a.id, target);
        assert!(matches!(result, Err(Error::CannotMoveIntoSelfOrDescendant)));
    }
    assert_eq!(t.tree_version(&project.id), before);
}

#[tokio::test]
async fn root_folder_is_immutable() {
    let t = TestTree::new();
    let project = t.project("root");
    let root = t.root_id(&project.id);

    let result = t
        .tree
        .rename_entity(&project.id, OWNER, NodeKind::Folder, &root, "top");
    assert!(matches!(result, Err(Error::CannotMutateRootFolder)));

    let result = t
        .tree
        .delete_entity(&project.id, OWNER, NodeKind::Folder, &root);
    assert!(matches!(result, Err(Error::CannotMutateRootFolder)));
}

#[tokio::test]
async fn deleting_folder_tombstones_whole_subtree() {
    let t = TestTree::new();
    let project = t.project("subtree");
    let root = t.root_id(&project.id);

    let src = t.tree.add_folder(&project.id, OWNER, &root, "src").unwrap();
    let nested = t.tree.add_folder(&project.id, OWNER, &src.id, "nested").unwrap();
    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &nested.id, "deep.tex", "")
        .unwrap();
    let keep = t
        .tree
        .create_doc(&project.id, OWNER, &root, "main.tex", "")
        .unwrap();

    let deleted = t
        .tree
        .delete_entity(&project.id, OWNER, NodeKind::Folder, &src.id)
        .unwrap();
    let ids: HashSet<&str> = deleted.deleted.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, HashSet::from([src.id.as_str(), nested.id.as_str(), doc.id.as_str()]));

    let live: Vec<String> = t
        .tree
        .get_project_tree(&project.id, Some(OWNER), None)
        .unwrap()
        .into_iter()
        .map(|e| e.header.id)
        .collect();
    assert!(live.contains(&keep.id));
    assert!(!live.contains(&src.id));
    assert!(!live.contains(&doc.id));

    let trash = t.tree.list_deleted_docs(&project.id, OWNER).unwrap();
    assert!(trash.iter().any(|n| n.id == doc.id));
}

#[tokio::test]
async fn duplicate_names_conflict_across_kinds() {
    let t = TestTree::new();
    let project = t.project("dupes");
    let root = t.root_id(&project.id);

    t.tree.add_folder(&project.id, OWNER, &root, "shared").unwrap();
    let result = t.tree.create_doc(&project.id, OWNER, &root, "shared", "");
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &root, "main.tex", "")
        .unwrap();
    let result = t
        .tree
        .rename_entity(&project.id, OWNER, NodeKind::Doc, &doc.id, "shared");
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    let result = t.tree.add_folder(&project.id, OWNER, &root, "main.tex");
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    let result = t
        .tree
        .ensure_is_doc(&project.id, OWNER, &root, "shared", "");
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    let mut names = t.store.list_folder_child_names(&project.id, &root).unwrap();
    names.sort();
    assert_eq!(names, ["main.tex", "shared"]);
}

#[tokio::test]
async fn folder_rename_cannot_take_a_doc_name() {
    let t = TestTree::new();
    let project = t.project("clash");
    let root = t.root_id(&project.id);

    let folder = t.tree.add_folder(&project.id, OWNER, &root, "drafts").unwrap();
    t.tree
        .create_doc(&project.id, OWNER, &root, "notes", "")
        .unwrap();
    let before = t.tree_version(&project.id);

    let result = t
        .tree
        .rename_entity(&project.id, OWNER, NodeKind::Folder, &folder.id, "notes");
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    let other = t.tree.add_folder(&project.id, OWNER, &root, "other").unwrap();
    t.tree
        .create_doc(&project.id, OWNER, &other.id, "drafts", "")
        .unwrap();
    let result = t
        .tree
        .move_entity(&project.id, OWNER, NodeKind::Folder, &folder.id, &other.id);
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));

    assert_eq!(t.tree_version(&project.id), before + 2);
    let entry = t
        .tree
        .find_entry_by_path(&project.id, Some(OWNER), None, "/drafts/")
        .unwrap();
    assert_eq!(entry.header.id, folder.id);
}

#[tokio::test]
async fn upload_cannot_replace_a_folder() {
    let t = TestTree::new();
    let project = t.project("uploads");
    let root = t.root_id(&project.id);

    let folder = t.tree.add_folder(&project.id, OWNER, &root, "assets").unwrap();
    let before = t.tree_version(&project.id);

    let result = t
        .tree
        .upload_file(&project.id, OWNER, &root, "assets", Bytes::from_static(b"x"), None)
        .await;
    assert!(matches!(result, Err(Error::DuplicateNameInFolder)));
    assert_eq!(t.tree_version(&project.id), before);

    let entries = t.tree.get_project_tree(&project.id, Some(OWNER), None).unwrap();
    let named: Vec<_> = entries
        .iter()
        .filter(|e| e.header.path.trim_end_matches('/') == "/assets")
        .collect();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].header.id, folder.id);
}

#[tokio::test]
async fn invalid_names_are_rejected_before_the_store() {
    let t = TestTree::new();
    let project = t.project("names");
    let root = t.root_id(&project.id);
    let before = t.tree_version(&project.id);

    for name in ["", ".", "..", "a/b", "tab\there", &"x".repeat(151)] {
        let result = t.tree.add_folder(&project.id, OWNER, &root, name);
        assert!(matches!(result, Err(Error::Validation(_))), "accepted {name:?}");
    }
    assert_eq!(t.tree_version(&project.id), before);
}

#[tokio::test]
async fn every_mutation_bumps_version_by_one() {
    let t = TestTree::new();
    let project = t.project("versions");
    let root = t.root_id(&project.id);
    let mut expected = t.tree_version(&project.id);

    let folder = t.tree.add_folder(&project.id, OWNER, &root, "f").unwrap();
    expected += 1;
    assert_eq!(folder.version, expected);

    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &root, "a.tex", "")
        .unwrap();
    expected += 1;
    assert_eq!(doc.version, expected);

    let moved = t
        .tree
        .move_entity(&project.id, OWNER, NodeKind::Doc, &doc.id, &folder.id)
        .unwrap();
    expected += 1;
    assert_eq!(moved.version, expected);

    let deleted = t
        .tree
        .delete_entity(&project.id, OWNER, NodeKind::Doc, &doc.id)
        .unwrap();
    expected += 1;
    assert_eq!(deleted.version, expected);
    assert_eq!(t.tree_version(&project.id), expected);
}

#[tokio::test]
async fn concurrent_mutations_get_distinct_versions() {
    let t = TestTree::new();
    let project = t.project("race");
    let root = t.root_id(&project.id);
    let start = t.tree_version(&project.id);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&t.store);
            let project_id = project.id.clone();
            let root = root.clone();
            thread::spawn(move || {
                store
                    .add_folder(&project_id, OWNER, &root, &format!("folder-{i}"))
                    .unwrap()
                    .version
            })
        })
        .collect();

    let versions: HashSet<i64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(versions.len(), 8);
    assert_eq!(versions.iter().max().copied(), Some(start + 8));
}

#[tokio::test]
async fn ensure_is_doc_replaces_file_once() {
    let t = TestTree::new();
    let project = t.project("ensure");
    let root = t.root_id(&project.id);

    let upload = t
        .tree
        .upload_file(&project.id, OWNER, &root, "a.tex", Bytes::from_static(b"binary"), None)
        .await
        .unwrap();

    let first = t
        .tree
        .ensure_is_doc(&project.id, OWNER, &root, "a.tex", "\\documentclass{article}")
        .unwrap();
    assert!(first.created);
    assert_eq!(first.replaced_file_id.as_deref(), Some(upload.file_id.as_str()));
    let version = t.tree_version(&project.id);

    let second = t
        .tree
        .ensure_is_doc(&project.id, OWNER, &root, "a.tex", "\\documentclass{article}")
        .unwrap();
    assert!(!second.created);
    assert_eq!(second.doc_id, first.doc_id);
    assert_eq!(t.tree_version(&project.id), version);

    let entries = t.tree.get_project_tree(&project.id, Some(OWNER), None).unwrap();
    let at_path: Vec<_> = entries.iter().filter(|e| e.header.path == "/a.tex").collect();
    assert_eq!(at_path.len(), 1);
    assert_eq!(at_path[0].kind(), NodeKind::Doc);
}

#[tokio::test]
async fn uploaded_file_is_readable_and_replaces_previous() {
    let t = TestTree::new();
    let project = t.project("uploads");
    let root = t.root_id(&project.id);

    let first = t
        .tree
        .upload_file(&project.id, OWNER, &root, "logo.png", Bytes::from_static(b"v1"), None)
        .await
        .unwrap();
    assert!(first.replaced.is_none());

    let second = t
        .tree
        .upload_file(&project.id, OWNER, &root, "logo.png", Bytes::from_static(b"v2"), None)
        .await
        .unwrap();
    assert_eq!(
        second.replaced.as_ref().map(|n| n.id.as_str()),
        Some(first.file_id.as_str())
    );

    let (meta, data) = t
        .tree
        .read_file(&project.id, Some(OWNER), None, &second.file_id)
        .await
        .unwrap();
    assert_eq!(&data[..], b"v2");
    assert_eq!(meta.size, 2);
    assert!(!meta.pending);

    let stale = t
        .tree
        .read_file(&project.id, Some(OWNER), None, "no-such-file")
        .await;
    assert!(matches!(stale, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn upload_lands_under_the_current_parent_path() {
    let t = TestTree::new();
    let project = t.project("moving");
    let root = t.root_id(&project.id);
    let pending = PendingFile {
        hash: "00".to_string(),
        size: 0,
        linked_file_data: None,
    };

    let folder = t.tree.add_folder(&project.id, OWNER, &root, "a").unwrap();
    let renamed_under = t
        .store
        .prepare_file_creation(&project.id, OWNER, &folder.id, "f.png", &pending)
        .unwrap();
    t.tree
        .rename_entity(&project.id, OWNER, NodeKind::Folder, &folder.id, "b")
        .unwrap();

    let finalized = t
        .store
        .finalize_file_creation(&project.id, OWNER, &renamed_under)
        .unwrap();
    assert_eq!(finalized.path, "/b/f.png");
    let node = t.store.get_tree_node(&project.id, &renamed_under).unwrap().unwrap();
    assert_eq!(node.path, "/b/f.png");
    assert_eq!(node.parent_id.as_deref(), Some(folder.id.as_str()));

    let moved_under = t
        .store
        .prepare_file_creation(&project.id, OWNER, &folder.id, "g.png", &pending)
        .unwrap();
    let outer = t.tree.add_folder(&project.id, OWNER, &root, "outer").unwrap();
    t.tree
        .move_entity(&project.id, OWNER, NodeKind::Folder, &folder.id, &outer.id)
        .unwrap();

    let finalized = t
        .store
        .finalize_file_creation(&project.id, OWNER, &moved_under)
        .unwrap();
    assert_eq!(finalized.path, "/outer/b/g.png");

    let entry = t
        .tree
        .find_entry_by_path(&project.id, Some(OWNER), None, "/outer/b/f.png")
        .unwrap();
    assert_eq!(entry.header.id, renamed_under);
}

#[tokio::test]
async fn restored_doc_gets_unique_name_in_root() {
    let t = TestTree::new();
    let project = t.project("restore");
    let root = t.root_id(&project.id);

    let old = t
        .tree
        .create_doc(&project.id, OWNER, &root, "main.tex", "")
        .unwrap();
    t.tree
        .delete_entity(&project.id, OWNER, NodeKind::Doc, &old.id)
        .unwrap();
    t.tree
        .create_doc(&project.id, OWNER, &root, "main.tex", "")
        .unwrap();

    let restored = t
        .tree
        .restore_doc(&project.id, OWNER, &old.id, None)
        .unwrap();
    assert_eq!(restored.path, "/main (1).tex");

    let result = t.tree.restore_doc(&project.id, OWNER, &old.id, None);
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn restore_checks_access_before_anything_else() {
    let t = TestTree::new();
    let project = t.project("private");
    let root = t.root_id(&project.id);

    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &root, "secret.tex", "")
        .unwrap();
    t.tree
        .delete_entity(&project.id, OWNER, NodeKind::Doc, &doc.id)
        .unwrap();

    for name in [None, Some("a/b")] {
        let result = t.tree.restore_doc(&project.id, "stranger", &doc.id, name);
        assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
    }
}

#[tokio::test]
async fn read_only_members_cannot_mutate() {
    let t = TestTree::new();
    let project = t.project("shared");
    let root = t.root_id(&project.id);

    t.tree
        .add_member(&project.id, OWNER, READER, PrivilegeLevel::ReadOnly)
        .unwrap();
    t.tree
        .add_member(&project.id, OWNER, EDITOR, PrivilegeLevel::ReadAndWrite)
        .unwrap();

    let result = t.tree.add_folder(&project.id, READER, &root, "nope");
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
    assert!(t.tree.get_project_tree(&project.id, Some(READER), None).is_ok());

    t.tree.add_folder(&project.id, EDITOR, &root, "yes").unwrap();

    let result = t.tree.get_project_tree(&project.id, Some("stranger"), None);
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn anonymous_token_grants_read_only() {
    let t = TestTree::new();
    let project = t.project("public");

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::TokenBased)
        .unwrap();
    let tokens = t.tree.ensure_access_tokens(&project.id, OWNER).unwrap();

    let auth = t
        .tree
        .authorize(&project.id, None, Some(&tokens.read_only))
        .unwrap();
    assert_eq!(auth.privilege_level, PrivilegeLevel::ReadOnly);
    assert!(auth.is_token_member);

    let mut wrong = tokens.read_only.clone();
    let last = if wrong.ends_with('b') { "c" } else { "b" };
    wrong.replace_range(wrong.len() - 1.., last);
    let result = t.tree.authorize(&project.id, None, Some(&wrong));
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));

    assert_eq!(t.tree.ensure_access_tokens(&project.id, OWNER).unwrap(), tokens);
}

#[tokio::test]
async fn signed_in_token_holder_becomes_member() {
    let t = TestTree::new();
    let project = t.project("links");

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::TokenBased)
        .unwrap();
    let tokens = t.tree.ensure_access_tokens(&project.id, OWNER).unwrap();

    let auth = t
        .tree
        .authorize(&project.id, Some(EDITOR), Some(&tokens.read_and_write))
        .unwrap();
    assert_eq!(auth.privilege_level, PrivilegeLevel::ReadAndWrite);

    let members = t.tree.list_members(&project.id, OWNER).unwrap();
    let member = members.iter().find(|m| m.user_id == EDITOR).unwrap();
    assert_eq!(member.privilege_level, PrivilegeLevel::ReadAndWrite);

    // The recorded membership keeps working without the token.
    let auth = t.tree.authorize(&project.id, Some(EDITOR), None).unwrap();
    assert!(auth.can_write());

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::Private)
        .unwrap();
    let result = t.tree.authorize(&project.id, Some(EDITOR), None);
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn token_member_loses_write_access_when_project_goes_private() {
    let t = TestTree::new();
    let project = t.project("revoked");
    let root = t.root_id(&project.id);

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::TokenBased)
        .unwrap();
    let tokens = t.tree.ensure_access_tokens(&project.id, OWNER).unwrap();
    t.tree
        .authorize(&project.id, Some(EDITOR), Some(&tokens.read_and_write))
        .unwrap();
    let folder = t.tree.add_folder(&project.id, EDITOR, &root, "mine").unwrap();

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::Private)
        .unwrap();
    let before = t.tree_version(&project.id);

    let result = t.tree.add_folder(&project.id, EDITOR, &root, "sneaky");
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
    let result = t
        .tree
        .rename_entity(&project.id, EDITOR, NodeKind::Folder, &folder.id, "renamed");
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
    let result = t
        .tree
        .upload_file(&project.id, EDITOR, &root, "x.png", Bytes::from_static(b"x"), None)
        .await;
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
    assert_eq!(t.tree_version(&project.id), before);

    // Invited members are unaffected by the sharing mode.
    t.tree
        .add_member(&project.id, OWNER, READER, PrivilegeLevel::ReadAndWrite)
        .unwrap();
    t.tree.add_folder(&project.id, READER, &root, "invited").unwrap();
}

#[tokio::test]
async fn sharing_link_opens_the_project() {
    let t = TestTree::new();
    let project = t.project("linked");

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::TokenBased)
        .unwrap();
    let tokens = t.tree.ensure_access_tokens(&project.id, OWNER).unwrap();

    let (joined, auth) = t
        .tree
        .join_by_token(Some(EDITOR), &tokens.read_and_write)
        .unwrap();
    assert_eq!(joined.id, project.id);
    assert_eq!(auth.privilege_level, PrivilegeLevel::ReadAndWrite);
    let members = t.tree.list_members(&project.id, OWNER).unwrap();
    assert!(members.iter().any(|m| m.user_id == EDITOR));

    let (joined, auth) = t.tree.join_by_token(None, &tokens.read_only).unwrap();
    assert_eq!(joined.id, project.id);
    assert_eq!(auth.privilege_level, PrivilegeLevel::ReadOnly);

    // Right prefix, wrong secret.
    let forged = format!("{}bbbbbbbbbbbb", tokens.read_and_write_prefix);
    assert_ne!(forged, tokens.read_and_write);
    for token in [forged.as_str(), "zzzzzzzzzzzz", "not a token"] {
        let result = t.tree.join_by_token(Some(READER), token);
        assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)), "{token}");
    }

    t.tree
        .set_public_access_level(&project.id, OWNER, PublicAccessLevel::Private)
        .unwrap();
    let result = t.tree.join_by_token(None, &tokens.read_only);
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn sharing_changes_bump_epoch() {
    let t = TestTree::new();
    let project = t.project("epochs");

    let added = t
        .tree
        .add_member(&project.id, OWNER, EDITOR, PrivilegeLevel::ReadAndWrite)
        .unwrap();
    assert!(added > project.epoch);

    let removed = t.tree.remove_member(&project.id, OWNER, EDITOR).unwrap();
    assert!(removed > added);

    let result = t.tree.remove_member(&project.id, EDITOR, OWNER);
    assert!(matches!(result, Err(Error::NotFoundOrNotAuthorized)));
}

#[tokio::test]
async fn mutations_publish_room_messages_and_path_updates() {
    let t = TestTree::new();
    let project = t.project("events");
    let root = t.root_id(&project.id);
    let mut rx = t.subscribe();

    let folder = t.tree.add_folder(&project.id, OWNER, &root, "figures").unwrap();
    let message = next_message(&mut rx).await;
    assert_eq!(message["room"], project.id.as_str());
    assert_eq!(message["message"]["type"], "newFolder");
    assert_eq!(message["message"]["payload"]["folderId"], folder.id.as_str());
    assert_eq!(message["message"]["payload"]["treeVersion"], folder.version);

    let doc = t
        .tree
        .create_doc(&project.id, OWNER, &folder.id, "fig1.tex", "")
        .unwrap();
    next_message(&mut rx).await;

    let renamed = t
        .tree
        .rename_entity(&project.id, OWNER, NodeKind::Folder, &folder.id, "images")
        .unwrap();
    let message = next_message(&mut rx).await;
    assert_eq!(message["message"]["type"], "entityRenamed");
    assert_eq!(message["message"]["payload"]["newName"], "images");

    let updates = t.content.updates.lock().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.version, renamed.version);
    assert_eq!(last.updates.len(), 1);
    assert_eq!(last.updates[0].id, doc.id);
    assert_eq!(last.updates[0].old_path.as_deref(), Some("/figures/fig1.tex"));
    assert_eq!(last.updates[0].new_path.as_deref(), Some("/images/fig1.tex"));
}

#[tokio::test]
async fn garbage_collection_reclaims_pending_uploads_and_old_projects() {
    let t = TestTree::new();
    let project = t.project("gc");
    let root = t.root_id(&project.id);

    // An upload that never got past the first phase.
    t.store
        .prepare_file_creation(
            &project.id,
            OWNER,
            &root,
            "crashed.png",
            &PendingFile {
                hash: "00".to_string(),
                size: 0,
                linked_file_data: None,
            },
        )
        .unwrap();

    let doomed = t.project("doomed");
    let doomed_root = t.root_id(&doomed.id);
    t.tree
        .upload_file(&doomed.id, OWNER, &doomed_root, "data.csv", Bytes::from_static(b"1,2"), None)
        .await
        .unwrap();
    t.tree.soft_delete_project(&doomed.id, OWNER).unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;

    let report = t
        .tree
        .collect_garbage(Duration::ZERO, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(report.pending_files, 1);
    assert_eq!(report.purged_projects, 1);
    assert_eq!(report.blobs_deleted, 1);

    assert!(t.store.get_project(&doomed.id).unwrap().is_none());
    assert!(t.store.get_project(&project.id).unwrap().is_some());
}
