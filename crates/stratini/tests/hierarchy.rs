//! End-to-end tests: the cache, the hierarchical loader, and file
//! persistence working together through the public API.

use std::fs;
use std::path::{Path, PathBuf};

use stratini::loader::{self, OutdatednessChecker, RegenChoice};
use stratini::{ConfigCache, ConfigFile, Endianness};

fn write_ini(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write ini fixture");
    path
}

fn load_into_cache(cache: &mut ConfigCache, leaf: &Path) {
    let mut merged = ConfigFile::new();
    loader::load_ini_hierarchy(leaf, &mut merged, false, cache.game_name())
        .expect("load hierarchy");
    cache.set_file(leaf, merged);
}

#[test]
fn test_based_on_chain_with_add_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = write_ini(dir.path(), "Engine.ini", "[X]\nFoo=1\n");
    let game = write_ini(
        dir.path(),
        "Game.ini",
        &format!(
            "[Configuration]\nBasedOn={}\n\n[X]\n+Foo=2\n",
            engine.display()
        ),
    );

    let mut cache = ConfigCache::new("ExampleGame");
    load_into_cache(&mut cache, &game);

    assert_eq!(
        cache.get_array("X", "Foo", &game),
        vec!["1".to_string(), "2".to_string()]
    );
}

#[test]
fn test_three_layer_chain_override_and_removal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = write_ini(
        dir.path(),
        "Root.ini",
        "[Core]\nPath=a\nPath=b\nKeep=yes\n",
    );
    let mid = write_ini(
        dir.path(),
        "Mid.ini",
        &format!(
            "[Configuration]\nBasedOn={}\n\n[Core]\n-Path=a\n+Path=c\n",
            root.display()
        ),
    );
    let leaf = write_ini(
        dir.path(),
        "Leaf.ini",
        &format!(
            "[Configuration]\nBasedOn={}\n\n[Core]\n!Path=\n+Path=final\n",
            mid.display()
        ),
    );

    let mut cache = ConfigCache::new("ExampleGame");
    load_into_cache(&mut cache, &leaf);

    assert_eq!(cache.get_array("Core", "Path", &leaf), vec!["final".to_string()]);
    assert_eq!(cache.get_string("Core", "Keep", &leaf).as_deref(), Some("yes"));
}

#[test]
fn test_set_then_flush_then_reload() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_ini(dir.path(), "Settings.ini", "[Audio]\nVolume=0.5\n");

    {
        let mut cache = ConfigCache::new("ExampleGame");
        cache.set_string("Audio", "Device", "default", &path);
        cache.set_bool("Audio", "Muted", true, &path);
        cache.flush(false, Some(&path));
    }

    let mut cache = ConfigCache::new("ExampleGame");
    assert_eq!(
        cache.get_string("Audio", "Volume", &path).as_deref(),
        Some("0.5")
    );
    assert_eq!(
        cache.get_string("Audio", "Device", &path).as_deref(),
        Some("default")
    );
    assert_eq!(cache.get_bool("Audio", "Muted", &path), Some(true));
}

#[test]
fn test_outdatedness_check_full_cycle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let base = write_ini(dir.path(), "BaseEngine.ini", "[Render]\nQuality=2\n");
    let default_ini = write_ini(
        dir.path(),
        "DefaultEngine.ini",
        &format!(
            "[Configuration]\nBasedOn={}\n\n[Render]\nQuality=3\n",
            base.display()
        ),
    );
    let generated_ini = dir.path().join("Engine.ini");

    let mut cache = ConfigCache::new("ExampleGame");
    let mut checker = OutdatednessChecker::default();
    let mut prompt = |_: &Path| -> RegenChoice { panic!("no prompt expected") };
    checker
        .check(&mut cache, &default_ini, &generated_ini, &mut prompt)
        .expect("check");

    // Generated from the merged chain, with the derived value winning.
    assert_eq!(cache.get_int("Render", "Quality", &generated_ini), Some(3));
    assert!(generated_ini.exists());

    // Touching the base invalidates the fingerprint; unattended mode
    // regenerates without asking.
    std::thread::sleep(std::time::Duration::from_millis(20));
    fs::write(&base, "[Render]\nQuality=9\n").expect("touch base");
    let mut cache = ConfigCache::new("ExampleGame");
    let mut checker = OutdatednessChecker::new(stratini::loader::RegenOptions {
        force_regenerate: false,
        unattended: true,
    });
    checker
        .check(&mut cache, &default_ini, &generated_ini, &mut prompt)
        .expect("recheck");
    assert_eq!(cache.get_int("Render", "Quality", &generated_ini), Some(3));
    assert_eq!(cache.get_int("Render", "_missing", &generated_ini), None);
}

#[test]
fn test_coalesce_and_reload_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_ini(dir.path(), "Engine.ini", "[X]\nFoo=\"a b\"\n");
    write_ini(dir.path(), "Game.ini", "[Y]\nBar=2\n");

    let mut cache = ConfigCache::new("ExampleGame");
    cache
        .coalesce_files_from_disk(dir.path(), Endianness::Little, None)
        .expect("coalesce");

    // Remove the loose files so any values must come from the archive.
    fs::remove_file(dir.path().join("Engine.ini")).expect("remove");
    fs::remove_file(dir.path().join("Game.ini")).expect("remove");

    let mut cache = ConfigCache::new("ExampleGame");
    cache.load_coalesced_file(dir.path()).expect("load archive");
    let engine = dir.path().join("Engine.ini");
    let game = dir.path().join("Game.ini");
    assert_eq!(
        cache.get_string("X", "Foo", &engine).as_deref(),
        Some("a b")
    );
    assert_eq!(cache.get_int("Y", "Bar", &game), Some(2));
}
