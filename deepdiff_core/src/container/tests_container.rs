//! End-to-end container comparisons driven through [`DiffEngine`],
//! covering archive extraction, member pairing and nesting.

use crate::engine::DiffEngine;
use deepdiff_common::Limits;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;

fn engine() -> DiffEngine {
    DiffEngine::new(Limits::default())
}

fn append_file(builder: &mut tar::Builder<fs::File>, name: &str, content: &str) {
    append_file_with_mtime(builder, name, content, 0);
}

fn append_file_with_mtime(
    builder: &mut tar::Builder<fs::File>,
    name: &str,
    content: &str,
    mtime: u64,
) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(mtime);
    builder
        .append_data(&mut header, name, content.as_bytes())
        .unwrap();
}

fn append_symlink(builder: &mut tar::Builder<fs::File>, name: &str, target: &str) {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Symlink);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, name, target).unwrap();
}

fn tar_builder(path: &Path) -> tar::Builder<fs::File> {
    tar::Builder::new(fs::File::create(path).unwrap())
}

#[cfg(unix)]
#[test]
fn test_tar_text_and_symlink_members() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");

    let mut b1 = tar_builder(&p1);
    append_file(&mut b1, "dir/text", "first line\nsecond line\n");
    append_symlink(&mut b1, "dir/link", "target-a");
    b1.finish().unwrap();

    let mut b2 = tar_builder(&p2);
    append_file(&mut b2, "dir/text", "first line\nsecond line changed\n");
    append_symlink(&mut b2, "dir/link", "target-b");
    b2.finish().unwrap();

    let diff = engine()
        .compare_paths(&p1, &p2)
        .unwrap()
        .expect("archives differ");

    assert_eq!(diff.details.len(), 2);

    let text = &diff.details[0];
    assert_eq!(text.source1, "dir/text");
    let unified = text.unified_diff.as_ref().expect("line diff expected");
    assert!(unified.contains("-second line"));
    assert!(unified.contains("+second line changed"));

    let link = &diff.details[1];
    assert_eq!(link.source1, "dir/link");
    assert!(link.comments.iter().any(|c| c == "symlink"));
    let unified = link.unified_diff.as_ref().expect("target diff expected");
    assert!(unified.contains("-destination: target-a"));
    assert!(unified.contains("+destination: target-b"));
}

#[test]
fn test_identical_archives_yield_no_difference() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");
    for path in [&p1, &p2] {
        let mut builder = tar_builder(path);
        append_file(&mut builder, "a.txt", "same\n");
        builder.finish().unwrap();
    }

    assert!(engine().compare_paths(&p1, &p2).unwrap().is_none());
}

#[test]
fn test_metadata_only_change_reports_container_comment() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");

    let mut b1 = tar_builder(&p1);
    append_file_with_mtime(&mut b1, "a.txt", "same\n", 100);
    b1.finish().unwrap();
    let mut b2 = tar_builder(&p2);
    append_file_with_mtime(&mut b2, "a.txt", "same\n", 200);
    b2.finish().unwrap();

    // members are identical, only the archive metadata differs
    let diff = engine()
        .compare_paths(&p1, &p2)
        .unwrap()
        .expect("archive bytes differ");
    assert!(diff.details.is_empty());
    assert!(diff
        .comments
        .iter()
        .any(|c| c.contains("yet data differs")));
    assert!(diff.unified_diff.is_some(), "hex dump diff expected");
}

#[test]
fn test_member_order_follows_archive_not_lexical() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");

    for (path, suffix) in [(&p1, "one"), (&p2, "two")] {
        let mut builder = tar_builder(path);
        append_file(&mut builder, "zebra", &format!("zebra {suffix}\n"));
        append_file(&mut builder, "apple", &format!("apple {suffix}\n"));
        builder.finish().unwrap();
    }

    let diff = engine().compare_paths(&p1, &p2).unwrap().unwrap();
    let order: Vec<&str> = diff.details.iter().map(|d| d.source1.as_str()).collect();
    assert_eq!(order, vec!["zebra", "apple"]);
}

#[test]
fn test_renamed_similar_member_paired_by_fuzzy_match() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");

    let base: String = (0..120)
        .map(|i| format!("payload line number {i} with some shared words\n"))
        .collect();
    let edited = base.replace("line number 57", "line number fifty-seven");
    assert!(base.len() as u64 >= crate::handle::FUZZY_MIN_SIZE);

    let mut b1 = tar_builder(&p1);
    append_file(&mut b1, "data-1.0.txt", &base);
    b1.finish().unwrap();
    let mut b2 = tar_builder(&p2);
    append_file(&mut b2, "data-1.1.txt", &edited);
    b2.finish().unwrap();

    let diff = engine()
        .compare_paths(&p1, &p2)
        .unwrap()
        .expect("archives differ");

    // one modification node, not a remove plus an add
    assert_eq!(diff.details.len(), 1);
    let node = &diff.details[0];
    assert_eq!(node.source1, "data-1.0.txt");
    assert_eq!(node.source2, "data-1.1.txt");
    assert!(node
        .comments
        .iter()
        .any(|c| c.starts_with("Files similar despite different names")));
    assert!(node.unified_diff.is_some());
}

#[test]
fn test_one_sided_members_reported() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.tar");
    let p2 = temp.path().join("two.tar");

    let mut b1 = tar_builder(&p1);
    append_file(&mut b1, "common", "same\n");
    append_file(&mut b1, "gone", "old\n");
    b1.finish().unwrap();
    let mut b2 = tar_builder(&p2);
    append_file(&mut b2, "common", "same\n");
    append_file(&mut b2, "fresh", "new\n");
    b2.finish().unwrap();

    let diff = engine().compare_paths(&p1, &p2).unwrap().unwrap();
    let comments: Vec<&str> = diff
        .details
        .iter()
        .flat_map(|d| d.comments.iter().map(String::as_str))
        .collect();
    assert!(comments
        .iter()
        .any(|c| c.contains("only present in the first container")));
    assert!(comments
        .iter()
        .any(|c| c.contains("only present in the second container")));
}

#[test]
fn test_zip_member_comparison() {
    let temp = TempDir::new().unwrap();
    let p1 = temp.path().join("one.zip");
    let p2 = temp.path().join("two.zip");

    for (path, body) in [(&p1, "alpha\n"), (&p2, "beta\n")] {
        let mut zip = zip::ZipWriter::new(fs::File::create(path).unwrap());
        zip.start_file("notes.txt", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(body.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    let diff = engine()
        .compare_paths(&p1, &p2)
        .unwrap()
        .expect("archives differ");
    assert_eq!(diff.details.len(), 1);
    assert_eq!(diff.details[0].source1, "notes.txt");
    let unified = diff.details[0].unified_diff.as_ref().unwrap();
    assert!(unified.contains("-alpha"));
    assert!(unified.contains("+beta"));
}

#[test]
fn test_gzip_of_tar_recurses_into_members() {
    let temp = TempDir::new().unwrap();
    let d1 = temp.path().join("left");
    let d2 = temp.path().join("right");
    fs::create_dir(&d1).unwrap();
    fs::create_dir(&d2).unwrap();
    let p1 = d1.join("inner.tar.gz");
    let p2 = d2.join("inner.tar.gz");

    for (path, body) in [(&p1, "version one\n"), (&p2, "version two\n")] {
        let mut tar_bytes = Vec::new();
        {
            let mut builder = tar::Builder::new(&mut tar_bytes);
            let mut header = tar::Header::new_gnu();
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            builder
                .append_data(&mut header, "readme", body.as_bytes())
                .unwrap();
            builder.finish().unwrap();
        }
        let file = fs::File::create(path).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        encoder.finish().unwrap();
    }

    let diff = engine()
        .compare_paths(&p1, &p2)
        .unwrap()
        .expect("archives differ");

    // gzip wraps exactly one decompressed member, which is itself a tar
    assert_eq!(diff.details.len(), 1);
    let inner_tar = &diff.details[0];
    assert_eq!(inner_tar.source1, "inner.tar");
    assert_eq!(inner_tar.details.len(), 1);
    let readme = &inner_tar.details[0];
    assert_eq!(readme.source1, "readme");
    let unified = readme.unified_diff.as_ref().unwrap();
    assert!(unified.contains("-version one"));
    assert!(unified.contains("+version two"));
}
