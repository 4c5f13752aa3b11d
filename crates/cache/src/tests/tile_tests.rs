use super::helpers::{manager_with, open_manager, quiet_config, set_cutoff, state};
use crate::{PyramidRegistry, TILES_DIR};
use codec::TileKey;
use index::OrderedIndex;
use std::fs;
use tempfile::tempdir;

// --------------------- Lookup ---------------------

#[test]
fn tile_path_is_stable_and_directories_exist() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());

    let first = m.tile_cache_file("imagery", "0123012", "png").unwrap();
    let second = m.tile_cache_file("imagery", "0123012", "png").unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with(dir.path().join(TILES_DIR)));
    assert!(first.parent().unwrap().is_dir());
    assert!(first.ends_with("012/301/2.png"));

    let stats = m.stats().unwrap();
    assert_eq!(stats.tiles, 1);
    assert_eq!(stats.pyramids, 1);
    Ok(())
}

#[test]
fn touching_a_tile_restamps_it() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    m.tile_cache_file("imagery", "abc", "jpg").unwrap();

    let st = state(&m);
    let id = st.pyramids.lock().id("imagery").unwrap();
    let key = TileKey::new(id, "abc").encode();
    let before = st.tile_index.get(&key)?.unwrap();

    m.new_ts();
    m.tile_cache_file("imagery", "abc", "jpg").unwrap();
    let after = st.tile_index.get(&key)?.unwrap();
    assert!(after > before);
    assert_eq!(after, m.ts().unwrap());
    Ok(())
}

#[test]
fn pyramids_get_distinct_directories() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    let a = m.tile_cache_file("imagery", "abc", "png").unwrap();
    let b = m.tile_cache_file("terrain", "abc", "png").unwrap();
    assert_ne!(a.parent(), b.parent());

    let expected = format!("{:x}", PyramidRegistry::hash_id("imagery") as u32);
    assert!(a.parent().unwrap().ends_with(expected));
    Ok(())
}

#[test]
fn unmappable_names_and_closed_manager_yield_none() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    assert!(m.tile_cache_file("imagery", "", "png").is_none());
    assert!(m.tile_cache_file("imagery", "abc", "p/g").is_none());
    assert_eq!(m.stats().unwrap().tiles, 0);

    let escaped = m.tile_cache_file("imagery", "../etc", "png").unwrap();
    assert!(escaped.starts_with(dir.path().join(TILES_DIR)));
    assert_eq!(m.stats().unwrap().tiles, 1);

    m.close(true);
    assert!(m.tile_cache_file("imagery", "abc", "png").is_none());
    Ok(())
}

#[test]
fn bare_parent_tile_leaves_room_for_children() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());

    let parent = m.tile_cache_file("dem", "012", "").unwrap();
    fs::write(&parent, b"parent")?;
    let child = m.tile_cache_file("dem", "0123", "").unwrap();
    fs::write(&child, b"child")?;

    assert_eq!(fs::read(&parent)?, b"parent");
    assert_eq!(m.stats().unwrap().tiles, 2);

    let report = m.run_gc_pass().unwrap();
    assert_eq!(report.tiles.orphans_removed, 0);
    assert!(parent.exists() && child.exists());
    Ok(())
}

#[test]
fn non_ascii_position_codes_are_kept_by_gc() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    let path = m.tile_cache_file("imagery", "n\u{f8}rd/\u{e5}s", "png").unwrap();
    fs::write(&path, b"tile")?;

    let report = m.run_gc_pass().unwrap();
    assert_eq!(report.tiles.orphans_removed, 0);
    assert!(path.exists());
    assert_eq!(m.tile_cache_file("imagery", "n\u{f8}rd/\u{e5}s", "png"), Some(path));
    Ok(())
}

#[test]
fn tiles_survive_reopen() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = {
        let (m, _) = open_manager(dir.path());
        let path = m.tile_cache_file("imagery", "0123", "png").unwrap();
        fs::write(&path, b"tile")?;
        path
    };

    let (m, _) = open_manager(dir.path());
    let stats = m.stats().unwrap();
    assert_eq!(stats.tiles, 1);
    assert_eq!(stats.pyramids, 1);
    assert_eq!(m.tile_cache_file("imagery", "0123", "png"), Some(path.clone()));
    assert_eq!(fs::read(&path)?, b"tile");
    Ok(())
}

// --------------------- Tile GC ---------------------

#[test]
fn entries_below_cutoff_are_evicted_with_their_files() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());

    let old = m.tile_cache_file("imagery", "aaa", "png").unwrap();
    fs::write(&old, vec![0u8; 100])?;
    let kept = m.tile_cache_file("imagery", "bbb", "png").unwrap();
    fs::write(&kept, vec![0u8; 100])?;

    set_cutoff(&m, m.ts().unwrap());
    let report = m.run_gc_pass().unwrap();
    assert_eq!(report.tiles.tiles_evicted, 1);
    assert_eq!(report.tiles.orphans_removed, 1);
    assert!(!old.exists());
    assert!(kept.exists());
    assert_eq!(m.stats().unwrap().tiles, 1);
    Ok(())
}

#[test]
fn orphan_tile_files_are_removed() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    let known = m.tile_cache_file("imagery", "abc", "png").unwrap();
    fs::write(&known, b"known")?;

    let orphan = known.with_file_name("zzz.png");
    fs::write(&orphan, b"orphan")?;
    let stray = dir.path().join(TILES_DIR).join("not-a-pyramid");
    fs::write(&stray, b"stray")?;

    let report = m.run_gc_pass().unwrap();
    assert_eq!(report.tiles.tiles_evicted, 0);
    assert_eq!(report.tiles.orphans_removed, 2);
    assert!(known.exists());
    assert!(!orphan.exists());
    assert!(!stray.exists());
    Ok(())
}

#[test]
fn size_budget_is_enforced_oldest_first() -> anyhow::Result<()> {
    const BUDGET: u64 = 100_000;
    const TILE_BYTES: usize = 3_000;

    let dir = tempdir()?;
    let (m, _) = manager_with(quiet_config().with_max_cache_size(BUDGET));
    m.open(dir.path())?;

    let tiles: Vec<_> = (0..50)
        .map(|i| {
            let path = m.tile_cache_file("imagery", &format!("t{i:02}"), "png").unwrap();
            fs::write(&path, vec![7u8; TILE_BYTES]).unwrap();
            path
        })
        .collect();

    // The first pass measures and moves the cutoff, the second evicts.
    let first = m.run_gc_pass().unwrap();
    assert!(first.tiles.total_size > BUDGET);
    assert_eq!(first.tiles.tiles_evicted, 0);
    let second = m.run_gc_pass().unwrap();
    assert!(second.tiles.tiles_evicted > 0);

    let survivors: Vec<bool> = tiles.iter().map(|p| p.exists()).collect();
    let first_kept = survivors.iter().position(|&s| s).unwrap();
    assert!(
        survivors[first_kept..].iter().all(|&s| s),
        "eviction must take the oldest tiles only"
    );
    assert!((15..=22).contains(&first_kept), "first kept tile was t{first_kept:02}");

    let resident: u64 = tiles
        .iter()
        .filter_map(|p| fs::metadata(p).ok())
        .map(|md| md.len())
        .sum();
    assert!(resident <= BUDGET);

    let stats = m.stats().unwrap();
    assert_eq!(stats.tiles, 50 - first_kept);
    assert!(stats.gc_cutoff > crate::INITIAL_CUTOFF);
    assert!(stats.gc_cutoff <= stats.tick);
    Ok(())
}

#[test]
fn under_budget_pass_keeps_cutoff() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    for i in 0..5 {
        let p = m.tile_cache_file("imagery", &format!("{i}"), "png").unwrap();
        fs::write(p, b"small")?;
    }
    let before = m.stats().unwrap().gc_cutoff;
    let report = m.run_gc_pass().unwrap();
    assert_eq!(report.tiles.cutoff, before);
    assert_eq!(report.tiles.tiles_evicted, 0);
    assert!(report.tiles.total_size >= 25);
    assert_eq!(m.stats().unwrap().total_size, report.tiles.total_size);
    Ok(())
}

// --------------------- Tile gate ---------------------

#[test]
fn gate_is_exclusive_and_released_on_drop() {
    use crate::tile_gate::TileGate;
    use std::sync::atomic::AtomicBool;

    let gate = TileGate::new();
    let enabled = AtomicBool::new(true);
    {
        let _held = gate.acquire(&enabled).unwrap();
        assert!(gate.is_locked());
    }
    assert!(!gate.is_locked());

    let disabled = AtomicBool::new(false);
    assert!(gate.acquire(&disabled).is_none());
}

#[test]
fn gate_is_free_between_tile_requests() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let (m, _) = open_manager(dir.path());
    m.tile_cache_file("imagery", "abc", "png").unwrap();
    assert!(!state(&m).tile_gate.is_locked());
    Ok(())
}
