use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use asmref_identity::{AssemblyIdentity, AssemblyVersion};
use asmref_metadata::{public_key_token, EcmaMetadataReader};
use asmref_pkgconfig::{cache_file_in, LockPolicy, PackageCache, PersistOutcome};
use asmref_test_utils::AssemblyBuilder;
use filetime::FileTime;
use fs2::FileExt;
use pretty_assertions::assert_eq;

fn new_cache() -> PackageCache {
    PackageCache::new(Arc::new(EcmaMetadataReader))
}

fn write_pc(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(format!("{name}.pc"));
    fs::write(&path, body).unwrap();
    path
}

fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

#[test]
fn unchanged_file_is_served_from_memory() {
    let tmp = tempfile::tempdir().unwrap();
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Foo.dll")
        .unwrap();
    let pc = write_pc(tmp.path(), "foo", "Name: Foo\nLibs: -r:Foo.dll\n");

    let cache = new_cache();
    let first = cache.get(&pc).unwrap();
    let second = cache.get(&pc).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.is_dirty());
}

#[test]
fn touching_a_pc_file_forces_a_reparse() {
    let tmp = tempfile::tempdir().unwrap();
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Foo.dll")
        .unwrap();
    AssemblyBuilder::new("Foo.Extra")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Foo.Extra.dll")
        .unwrap();
    let pc = write_pc(tmp.path(), "foo", "Name: Foo\nLibs: -r:Foo.dll\n");
    set_mtime(&pc, 1_600_000_000);

    let cache = new_cache();
    let before = cache.get(&pc).unwrap();
    assert_eq!(before.assemblies.len(), 1);

    fs::write(&pc, "Name: Foo\nLibs: -r:Foo.dll -r:Foo.Extra.dll\n").unwrap();
    set_mtime(&pc, 1_600_000_100);

    let after = cache.get(&pc).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(after.assemblies.len(), 2);
}

#[test]
fn packages_without_assemblies_are_cached_as_invalid() {
    let tmp = tempfile::tempdir().unwrap();
    let pc = write_pc(tmp.path(), "empty", "Name: Empty\nLibs: -r:Missing.dll\n");

    let cache = new_cache();
    let descriptor = cache.get(&pc).unwrap();
    assert!(!descriptor.is_valid());
    assert_eq!(cache.entries().len(), 1);
    assert!(cache.packages().is_empty());
    assert!(Arc::ptr_eq(&descriptor, &cache.get(&pc).unwrap()));
}

#[test]
fn missing_pc_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(new_cache().get(&tmp.path().join("nope.pc")).is_err());
}

#[test]
fn persistence_round_trip_reproduces_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let lib = tmp.path().join("lib");
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(&lib, "Foo.dll")
        .unwrap();
    let pc_dir = tmp.path().join("pkgconfig");
    fs::create_dir_all(&pc_dir).unwrap();
    write_pc(
        &pc_dir,
        "foo",
        &format!(
            "libdir={}\nName: Foo\nVersion: 1.0\nDescription: Foo & friends\nGacPackage=false\nLibs: -r:${{libdir}}/Foo.dll\n",
            lib.display()
        ),
    );
    write_pc(&pc_dir, "empty", "Name: Empty\n");

    let cache_file = cache_file_in(&tmp.path().join("state"));
    let original = new_cache()
        .with_cache_file(Some(cache_file.clone()))
        .with_search_dirs(vec![pc_dir.clone()]);
    assert_eq!(original.load(), PersistOutcome::Absent);
    assert_eq!(original.scan_search_dirs().len(), 2);
    assert_eq!(original.save(), PersistOutcome::Saved { entries: 2 });
    assert_eq!(original.save(), PersistOutcome::Clean);
    let expected = original.entries();
    drop(original);

    let reloaded = new_cache()
        .with_cache_file(Some(cache_file))
        .with_search_dirs(vec![pc_dir.clone()]);
    assert_eq!(reloaded.load(), PersistOutcome::Loaded { entries: 2 });
    assert!(!reloaded.is_dirty());

    let actual = reloaded.entries();
    assert_eq!(
        actual.iter().map(|d| (*d.as_ref()).clone()).collect::<Vec<_>>(),
        expected.iter().map(|d| (*d.as_ref()).clone()).collect::<Vec<_>>()
    );

    // Unchanged files are served from the loaded entries without a re-parse.
    let foo = reloaded.get(&pc_dir.join("foo.pc")).unwrap();
    assert!(Arc::ptr_eq(&foo, &actual[1]));
    assert!(!foo.is_gac_package);
    assert!(!reloaded.is_dirty());
}

#[test]
fn contended_cache_file_degrades_to_memory() {
    let tmp = tempfile::tempdir().unwrap();
    let pc = write_pc(tmp.path(), "empty", "Name: Empty\n");
    let cache_file = tmp.path().join("cache.xml");

    let cache = new_cache()
        .with_cache_file(Some(cache_file.clone()))
        .with_lock_policy(LockPolicy {
            attempts: 2,
            delay: Duration::from_millis(10),
        });
    cache.get(&pc).unwrap();

    let holder = fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(tmp.path().join("cache.xml.lock"))
        .unwrap();
    FileExt::lock_exclusive(&holder).unwrap();

    assert_eq!(cache.save(), PersistOutcome::Contended);
    assert!(cache.is_dirty());
    assert!(!cache_file.exists());

    FileExt::unlock(&holder).unwrap();
    assert_eq!(cache.save(), PersistOutcome::Saved { entries: 1 });
}

#[test]
fn corrupt_cache_file_is_reported_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_file = tmp.path().join("cache.xml");
    fs::write(&cache_file, "<PcFileCache><File path=").unwrap();

    let cache = new_cache().with_cache_file(Some(cache_file));
    assert!(matches!(cache.load(), PersistOutcome::Failed(_)));
    assert!(cache.entries().is_empty());
}

#[test]
fn full_name_lookup_ignores_neutral_culture_null_token_and_hex_case() {
    let tmp = tempfile::tempdir().unwrap();
    let key: Vec<u8> = (0u8..160).collect();
    let token = public_key_token(&key).to_string();
    AssemblyBuilder::new("Bar")
        .version("1.2.0.0")
        .write_in(tmp.path(), "Bar.dll")
        .unwrap();
    AssemblyBuilder::new("Baz")
        .version("1.0.0.0")
        .public_key(&key)
        .write_in(tmp.path(), "Baz.dll")
        .unwrap();
    write_pc(tmp.path(), "bar", "Name: Bar\nLibs: -r:Bar.dll -r:Baz.dll\n");

    let cache = new_cache().with_search_dirs(vec![tmp.path().to_path_buf()]);
    cache.scan_search_dirs();

    let bar = Some(tmp.path().join("Bar.dll"));
    for query in [
        "Bar, Version=1.2.0.0, PublicKeyToken=null",
        "Bar, Version=1.2.0.0",
        "Bar, Version=1.2.0.0, Culture=neutral",
        "Bar, Version=1.2.0.0, Culture=neutral, processorArchitecture=MSIL",
    ] {
        assert_eq!(cache.get_assembly_location(query), bar, "{query}");
    }
    assert_eq!(cache.get_assembly_location("Bar, Version=9.0.0.0"), None);
    assert_eq!(cache.get_assembly_location("Bar, Version=1.2.0.0, Culture=fr"), None);

    let baz = Some(tmp.path().join("Baz.dll"));
    assert_eq!(
        cache.get_assembly_location(&format!("Baz, Version=1.0.0.0, PublicKeyToken={token}")),
        baz
    );
    assert_eq!(
        cache.get_assembly_location(&format!(
            "Baz, Version=1.0.0.0, Culture=neutral, PublicKeyToken={}",
            token.to_uppercase()
        )),
        baz
    );
}

#[test]
fn deleted_package_files_drop_out_of_the_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let pc_dir = tmp.path().join("pc");
    fs::create_dir_all(&pc_dir).unwrap();
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(&pc_dir, "Foo.dll")
        .unwrap();
    let pc = write_pc(&pc_dir, "foo", "Name: Foo\nLibs: -r:Foo.dll\n");
    let cache_file = tmp.path().join("cache.xml");

    let first = new_cache()
        .with_cache_file(Some(cache_file.clone()))
        .with_search_dirs(vec![pc_dir.clone()]);
    assert_eq!(first.scan_search_dirs().len(), 1);
    assert_eq!(first.save(), PersistOutcome::Saved { entries: 1 });

    fs::remove_file(&pc).unwrap();

    let second = new_cache()
        .with_cache_file(Some(cache_file))
        .with_search_dirs(vec![pc_dir]);
    assert_eq!(second.load(), PersistOutcome::Loaded { entries: 1 });
    assert!(second.scan_search_dirs().is_empty());
    assert!(second.entries().is_empty());
    assert!(second.packages().is_empty());
    assert!(second
        .find_assembly(&AssemblyIdentity::new("Foo"), false)
        .is_none());
    assert!(second.is_dirty());
    assert_eq!(second.save(), PersistOutcome::Saved { entries: 0 });
}

#[test]
fn loaded_entries_are_listed_only_after_a_disk_check() {
    let tmp = tempfile::tempdir().unwrap();
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Foo.dll")
        .unwrap();
    let pc = write_pc(tmp.path(), "foo", "Name: Foo\nLibs: -r:Foo.dll\n");
    let cache_file = tmp.path().join("cache.xml");

    let first = new_cache().with_cache_file(Some(cache_file.clone()));
    first.get(&pc).unwrap();
    first.save();

    let second = new_cache().with_cache_file(Some(cache_file));
    second.load();
    assert_eq!(second.entries().len(), 1);
    assert!(second.packages().is_empty());
    assert!(second.find_assembly(&AssemblyIdentity::new("Foo"), false).is_none());

    second.get(&pc).unwrap();
    assert_eq!(second.packages().len(), 1);
    assert!(second.find_assembly(&AssemblyIdentity::new("Foo"), false).is_some());
}

#[test]
fn index_is_rebuilt_after_packages_are_added() {
    let tmp = tempfile::tempdir().unwrap();
    AssemblyBuilder::new("Foo")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Foo.dll")
        .unwrap();
    AssemblyBuilder::new("Bar")
        .version("1.0.0.0")
        .write_in(tmp.path(), "Bar.dll")
        .unwrap();
    let foo = write_pc(tmp.path(), "foo", "Name: Foo\nLibs: -r:Foo.dll\n");

    let cache = new_cache();
    cache.get(&foo).unwrap();
    assert!(cache.get_assembly_location("Foo, Version=1.0.0.0").is_some());
    assert_eq!(cache.get_assembly_location("Bar, Version=1.0.0.0"), None);

    let bar = write_pc(tmp.path(), "bar", "Name: Bar\nLibs: -r:Bar.dll\n");
    cache.get(&bar).unwrap();
    assert_eq!(
        cache.get_assembly_location("Bar, Version=1.0.0.0"),
        Some(tmp.path().join("Bar.dll"))
    );

    cache.invalidate_index();
    assert!(cache.get_assembly_location("Foo, Version=1.0.0.0").is_some());
}

#[test]
fn unversioned_request_picks_highest_package_assembly() {
    let tmp = tempfile::tempdir().unwrap();
    for (dir, version) in [("v1", "1.0.0.0"), ("v2", "2.0.0.0"), ("v15", "1.5.0.0")] {
        let lib = tmp.path().join(dir);
        AssemblyBuilder::new("Foo")
            .version(version)
            .write_in(&lib, "Foo.dll")
            .unwrap();
        write_pc(tmp.path(), &format!("foo-{dir}"), &format!("Libs: -r:{dir}/Foo.dll\n"));
    }

    let cache = new_cache().with_search_dirs(vec![tmp.path().to_path_buf()]);
    cache.scan_search_dirs();

    let hit = cache
        .find_assembly(&AssemblyIdentity::new("Foo"), false)
        .unwrap();
    assert_eq!(hit.assembly.version, Some(AssemblyVersion::new(2, 0, 0, 0)));
    assert_eq!(hit.package, "foo-v2");

    let exact = cache
        .find_assembly(
            &AssemblyIdentity::new("Foo").with_version(AssemblyVersion::new(1, 5, 0, 0)),
            false,
        )
        .unwrap();
    assert_eq!(exact.assembly.file, tmp.path().join("v15/Foo.dll"));

    assert!(cache
        .find_assembly(
            &AssemblyIdentity::new("Foo").with_version(AssemblyVersion::new(3, 0, 0, 0)),
            false,
        )
        .is_none());
}

#[test]
fn find_package_uses_file_stem() {
    let tmp = tempfile::tempdir().unwrap();
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    write_pc(&second, "mono-addins", "Name: Mono.Addins (second)\n");
    write_pc(&first, "mono-addins", "Name: Mono.Addins\n");

    let cache = new_cache().with_search_dirs(vec![first.clone(), second]);
    let found = cache.find_package("mono-addins").unwrap();
    assert_eq!(found.name, "Mono.Addins");
    assert_eq!(found.path, first.join("mono-addins.pc"));
    assert!(cache.find_package("absent").is_none());
}
