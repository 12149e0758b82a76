//! End-to-end scenarios (§8), driven through the public `Filesystem` API
//! exactly as a host would, against a `Vec<u8>` standing in for the mmap'd
//! region.

use regionfs::{Errno, Filesystem};

const ONE_MIB: usize = 1 << 20;

fn fresh_region(size: usize) -> Vec<u8> {
    vec![0u8; size]
}

#[test]
fn scenario_1_fresh_mount_root_attributes() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    let attr = fs.getattr("/", 1000, 1000).unwrap();
    assert_eq!(attr.mode, 0o40_755);
    assert_eq!(attr.nlink, 2);
}

#[test]
fn scenario_2_mknod_write_read_getattr() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mknod("/a").unwrap();
    fs.write("/a", 0, b"Hello").unwrap();
    let buf = fs.read("/a", 0, 5).unwrap();
    assert_eq!(buf, b"Hello");
    assert_eq!(fs.getattr("/a", 1000, 1000).unwrap().size, 5);
}

#[test]
fn scenario_3_mkdir_mknod_readdir() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/d").unwrap();
    fs.mknod("/d/x").unwrap();
    let names = fs.readdir("/d").unwrap();
    assert_eq!(names, vec!["x".to_string()]);
}

#[test]
fn scenario_4_truncate_grow_reads_zeroes() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mknod("/a").unwrap();
    fs.truncate("/a", 2048).unwrap();
    let buf = fs.read("/a", 0, 2048).unwrap();
    assert_eq!(buf.len(), 2048);
    assert!(buf.iter().all(|&b| b == 0));
}

#[test]
fn scenario_5_write_past_eof_creates_hole() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mknod("/a").unwrap();
    fs.write("/a", 100_000, b"X").unwrap();
    assert_eq!(fs.getattr("/a", 1000, 1000).unwrap().size, 100_001);
    let buf = fs.read("/a", 0, 1).unwrap();
    assert_eq!(buf, vec![0u8]);
}

#[test]
fn scenario_6_remount_preserves_bytes_and_timestamps() {
    let mut bytes = fresh_region(ONE_MIB);
    let original_mtime;
    {
        let mut fs = Filesystem::mount(&mut bytes).unwrap();
        fs.mknod("/a").unwrap();
        original_mtime = fs.getattr("/a", 1000, 1000).unwrap().mtime;
    }
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    let buf = fs.read("/a", 0, 0).unwrap();
    assert_eq!(buf, Vec::<u8>::new());
    assert_eq!(fs.getattr("/a", 1000, 1000).unwrap().mtime, original_mtime);
}

#[test]
fn round_trip_mkdir_rmdir_restores_tree() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    let before = fs.readdir("/").unwrap();
    fs.mkdir("/tmp").unwrap();
    fs.rmdir("/tmp").unwrap();
    let after = fs.readdir("/").unwrap();
    assert_eq!(before, after);
}

#[test]
fn round_trip_mknod_unlink_restores_tree() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    let before = fs.readdir("/").unwrap();
    fs.mknod("/f").unwrap();
    fs.unlink("/f").unwrap();
    let after = fs.readdir("/").unwrap();
    assert_eq!(before, after);
}

#[test]
fn round_trip_truncate_zero_then_rewrite_matches_single_write() {
    let mut first_bytes = fresh_region(ONE_MIB);
    let mut fs_a = Filesystem::mount(&mut first_bytes).unwrap();
    fs_a.mknod("/a").unwrap();
    fs_a.write("/a", 100, b"data").unwrap();
    fs_a.truncate("/a", 0).unwrap();
    fs_a.write("/a", 100, b"data").unwrap();

    let mut second_bytes = fresh_region(ONE_MIB);
    let mut fs_b = Filesystem::mount(&mut second_bytes).unwrap();
    fs_b.mknod("/a").unwrap();
    fs_b.write("/a", 100, b"data").unwrap();

    assert_eq!(fs_a.read("/a", 0, 104).unwrap(), fs_b.read("/a", 0, 104).unwrap());
}

#[test]
fn round_trip_rename_onto_self_is_noop() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mknod("/a").unwrap();
    fs.write("/a", 0, b"data").unwrap();
    fs.rename("/a", "/a").unwrap();
    assert_eq!(fs.read("/a", 0, 4).unwrap(), b"data");
}

#[test]
fn rename_directory_across_parents_fixes_up_parent_backreference() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/a").unwrap();
    fs.mkdir("/b").unwrap();
    fs.mkdir("/a/d").unwrap();

    fs.rename("/a/d", "/b/d").unwrap();

    // `..` from inside the moved directory must resolve to its new parent.
    assert_eq!(fs.readdir("/b/d/..").unwrap(), vec!["d".to_string()]);
    assert_eq!(fs.readdir("/a").unwrap(), Vec::<String>::new());
}

#[test]
fn boundary_region_too_small_for_any_create_is_enospc() {
    let mut bytes = fresh_region(64);
    assert_eq!(Filesystem::mount(&mut bytes).unwrap_err(), Errno::NoSpace);
}

#[test]
fn boundary_name_255_succeeds_256_fails() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();

    let name_255 = "a".repeat(255);
    fs.mknod(&format!("/{name_255}")).unwrap();

    let name_256 = "a".repeat(256);
    assert_eq!(fs.mknod(&format!("/{name_256}")).unwrap_err(), Errno::NameTooLong);
}

#[test]
fn boundary_rmdir_nonempty_is_enotempty() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/d").unwrap();
    fs.mknod("/d/x").unwrap();
    assert_eq!(fs.rmdir("/d").unwrap_err(), Errno::NotEmpty);
}

#[test]
fn boundary_rename_over_nonempty_directory_is_enotempty() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/a").unwrap();
    fs.mkdir("/b").unwrap();
    fs.mknod("/b/x").unwrap();
    assert_eq!(fs.rename("/a", "/b").unwrap_err(), Errno::NotEmpty);
}

#[test]
fn boundary_rename_making_directory_its_own_descendant_is_einval() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/d").unwrap();
    assert_eq!(fs.rename("/d", "/d/sub").unwrap_err(), Errno::Invalid);
}

#[test]
fn property_allocated_and_free_cover_region_exactly() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mknod("/a").unwrap();
    fs.write("/a", 0, &vec![1u8; 5000]).unwrap();
    fs.mkdir("/d").unwrap();

    let info = fs.statfs().unwrap();
    assert!(info.f_bfree <= info.f_blocks);
}

#[test]
fn property_directory_slot_zero_is_parent_offset() {
    let mut bytes = fresh_region(ONE_MIB);
    let mut fs = Filesystem::mount(&mut bytes).unwrap();
    fs.mkdir("/d").unwrap();
    fs.mkdir("/d/e").unwrap();
    // `..` from /d/e must resolve back to /d, and from /d back to /.
    let d_attr = fs.getattr("/d/e/..", 1000, 1000).unwrap();
    assert_eq!(d_attr.mode, 0o40_755);
    let root_attr = fs.getattr("/d/..", 1000, 1000).unwrap();
    assert_eq!(root_attr.nlink, 2);
}
