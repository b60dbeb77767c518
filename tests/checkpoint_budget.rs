use mask_history::components::checkpoints::{self, CheckpointStore};
use mask_history::components::tiles;
use mask_history::{HistoryConfig, HistoryManager, MaskBuffer, NewStroke, StrokeMode};

fn painted_rect(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> MaskBuffer {
    let mut m = MaskBuffer::new(width, height).unwrap();
    for y in y0..y1 {
        for x in x0..x1 {
            m.set(x, y, 255);
        }
    }
    m
}

#[test]
fn tile_count_matches_cells_touched() {
    let m = painted_rect(300, 200, 60, 40, 140, 90);
    let encoded = tiles::encode(m.as_bytes(), 300, 200, 64).unwrap();
    // x 60..140 spans columns 0..=2, y 40..90 spans rows 0..=1
    assert_eq!(encoded.len(), 6);
    assert_eq!(tiles::decode(&encoded, 300, 200).unwrap(), m);
}

#[test]
fn full_and_tiled_reconstruct_identically() {
    let mut m = painted_rect(130, 70, 0, 0, 7, 70);
    m.set(129, 69, 255);
    m.set(64, 33, 255);
    let full = checkpoints::create_full(&m, 4);
    let tiled = checkpoints::create_tile_based(m.as_bytes(), 130, 70, 32, 4).unwrap();
    assert_eq!(full.reconstruct().unwrap(), tiled.reconstruct().unwrap());
    assert_eq!(tiled.reconstruct().unwrap(), m);
    assert!(tiled.memory_size() < full.memory_size());
}

#[test]
fn checkpoint_input_is_copied() {
    let mut h = HistoryManager::new(16, 16).unwrap();
    let mut live = vec![0u8; 256];
    live[5] = 255;
    let id = h.create_full_checkpoint(&live).unwrap().id;
    live[5] = 0;
    live[6] = 255;
    let cp = h.checkpoints().find(|c| c.id == id).unwrap();
    let back = cp.reconstruct().unwrap();
    assert_eq!(back.as_bytes()[5], 255);
    assert_eq!(back.as_bytes()[6], 0);
}

#[test]
fn budget_evicts_but_keeps_a_base() {
    const SIZE: u32 = 2048;
    let mut h = HistoryManager::with_config(
        SIZE,
        SIZE,
        HistoryConfig {
            max_memory_mb: 50,
            ..HistoryConfig::default()
        },
    )
    .unwrap();
    let mut live = MaskBuffer::new(SIZE, SIZE).unwrap();
    for i in 0..20 {
        let s = h
            .add_stroke(
                NewStroke::new(vec![(50.0 + 90.0 * i as f32, 100.0)], 20.0, StrokeMode::Paint),
                None,
            )
            .unwrap();
        live = h.apply_brush_stroke(&live, &s);
        h.create_full_checkpoint(live.as_bytes()).unwrap();
    }

    assert!(h.checkpoint_count() < 20);
    assert!(h.memory_usage_mb() <= h.max_memory_mb() as f64);
    assert!(h.checkpoints().any(|c| c.stroke_index == 0));
    assert!(h.checkpoints().any(|c| c.stroke_index == 19));

    for index in 0..20 {
        assert!(h.nearest_checkpoint(index).is_some(), "no base for {index}");
    }
    assert_eq!(h.reconstruct_current().unwrap(), live);
    assert!(h.validate_integrity().is_valid);
}

#[test]
fn store_floor_survives_budget_cuts() {
    let mut store = CheckpointStore::new(50);
    let big = MaskBuffer::new(2048, 1024).unwrap();
    for index in 0..40 {
        store.add(checkpoints::create_full(&big, index));
    }
    assert!(store.memory_usage_mb() <= 50.0);
    assert_eq!(store.iter().next().map(|c| c.stroke_index), Some(0));
    assert_eq!(store.find_nearest(39).map(|c| c.stroke_index), Some(39));
    assert!(store.find_nearest(-1).is_none());
    assert_eq!(store.set_max_memory_mb(1), 50);
}
