use mask_history::ops::brush;
use mask_history::{HistoryConfig, HistoryManager, HistoryState, MaskBuffer, NewStroke, StrokeMode};

fn dot(x: f32, y: f32) -> NewStroke {
    NewStroke::new(vec![(x, y)], 6.0, StrokeMode::Paint)
}

fn line(from: (f32, f32), to: (f32, f32), mode: StrokeMode) -> NewStroke {
    NewStroke::new(vec![from, to], 5.0, mode)
}

#[test]
fn empty_history_state() {
    let h = HistoryManager::new(64, 64).unwrap();
    assert_eq!(
        h.state(),
        HistoryState {
            stroke_count: 0,
            current_index: -1,
            can_undo: false,
            can_redo: false,
        }
    );
}

#[test]
fn one_stroke_enables_undo() {
    let mut h = HistoryManager::new(64, 64).unwrap();
    let stroke = h.add_stroke(dot(10.0, 10.0), None).unwrap();
    assert!(stroke.id.starts_with("stroke-"));
    let state = h.state();
    assert!(state.can_undo);
    assert!(!state.can_redo);
    assert_eq!(state.stroke_count, 1);
}

#[test]
fn undo_twice_then_redo_twice() {
    let mut h = HistoryManager::new(64, 64).unwrap();
    for i in 0..3 {
        h.add_stroke(dot(10.0 + 10.0 * i as f32, 10.0), None).unwrap();
    }
    assert!(h.undo().is_some());
    assert!(h.undo().is_some());
    assert_eq!(h.state().current_index, 0);
    assert!(h.state().can_redo);

    assert!(h.redo().is_some());
    assert!(h.redo().is_some());
    assert_eq!(h.state().current_index, 2);
    assert!(!h.state().can_redo);
    assert!(h.redo().is_none());
}

#[test]
fn undo_on_empty_is_a_no_op() {
    let mut h = HistoryManager::new(8, 8).unwrap();
    assert!(h.undo().is_none());
    assert_eq!(h.state().current_index, -1);
}

#[test]
fn corner_checkpoint_stores_one_tile() {
    let mut h = HistoryManager::new(512, 512).unwrap();
    let mut mask = MaskBuffer::new(512, 512).unwrap();
    for y in 0..256 {
        for x in 0..256 {
            mask.set(x, y, 255);
        }
    }
    let cp = h.create_tile_based_checkpoint(mask.as_bytes()).unwrap();
    assert!(!cp.is_full());
    assert_eq!(cp.tile_count(), 1);
    assert_eq!(cp.reconstruct().unwrap(), mask);
}

#[test]
fn export_coerces_exactly_the_corrupt_bytes() {
    let h = HistoryManager::new(16, 16).unwrap();
    let mut raw = vec![0u8; 256];
    for b in raw.iter_mut().skip(100).take(40) {
        *b = 255;
    }
    raw[3] = 7;
    raw[120] = 128;
    raw[200] = 254;

    assert_eq!(h.validate_mask(&raw).unwrap(), vec![3, 120, 200]);

    let export = h.export_mask(&raw).unwrap();
    assert_eq!(export.corrected_pixels, 3);
    assert!(export.mask.is_binary());
    let changed: Vec<usize> = raw
        .iter()
        .zip(export.mask.as_bytes())
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(changed, vec![3, 120, 200]);
    assert_eq!(export.mask.as_bytes()[3], 0);
    assert_eq!(export.mask.as_bytes()[120], 255);
    assert_eq!(export.mask.as_bytes()[200], 255);
}

#[test]
fn periodic_checkpoint_after_third_stroke() {
    let config = HistoryConfig {
        checkpoint_interval: 3,
        ..HistoryConfig::default()
    };
    let mut h = HistoryManager::with_config(64, 64, config).unwrap();
    let mut live = MaskBuffer::new(64, 64).unwrap();

    for i in 0..3 {
        assert_eq!(h.checkpoint_count(), 0, "checkpoint before stroke {}", i + 1);
        let stroke = dot(8.0 + 16.0 * i as f32, 20.0);
        brush::apply_stroke(&mut live, &stroke.points, stroke.brush_size, stroke.mode);
        h.add_stroke(stroke, Some(live.as_bytes())).unwrap();
    }
    assert_eq!(h.checkpoint_count(), 1);
    let cp = h.nearest_checkpoint(2).unwrap();
    assert_eq!(cp.stroke_index, 2);
    assert_eq!(cp.reconstruct().unwrap(), live);
}

#[test]
fn reconstruction_is_deterministic() {
    let mut h = HistoryManager::new(96, 96).unwrap();
    h.add_stroke(line((3.3, 4.1), (80.2, 60.9), StrokeMode::Paint), None).unwrap();
    h.add_stroke(line((50.0, 2.0), (10.5, 90.0), StrokeMode::Paint), None).unwrap();
    h.add_stroke(line((0.0, 40.0), (95.0, 40.0), StrokeMode::Erase), None).unwrap();

    let first = h.reconstruct_at(2).unwrap();
    for _ in 0..10 {
        assert_eq!(h.reconstruct_at(2).unwrap(), first);
    }
    assert!(first.is_binary());
    assert!(first.painted_count() > 0);
}

#[test]
fn undo_redo_round_trip_restores_state() {
    let mut h = HistoryManager::new(64, 64).unwrap();
    let mut live = MaskBuffer::new(64, 64).unwrap();
    for i in 0..6 {
        let s = h.add_stroke(dot(5.0 + 9.0 * i as f32, 30.0), None).unwrap();
        live = h.apply_brush_stroke(&live, &s);
        if i == 2 {
            h.create_checkpoint(live.as_bytes()).unwrap();
        }
    }
    let before = h.state();
    let mask_before = h.reconstruct_current().unwrap();

    for _ in 0..6 {
        h.undo();
    }
    assert_eq!(h.reconstruct_current().unwrap().painted_count(), 0);
    for _ in 0..6 {
        h.redo();
    }
    assert_eq!(h.state(), before);
    assert_eq!(h.reconstruct_current().unwrap(), mask_before);
    assert_eq!(mask_before, live);

    let cp = h.nearest_checkpoint(5).unwrap();
    let mut replayed = Vec::new();
    h.replay_from_checkpoint(cp, 5, &mut |s| replayed.push(s.id.clone())).unwrap();
    let from_log: Vec<String> = h
        .strokes_from_checkpoint(cp, 5)
        .iter()
        .map(|s| s.id.clone())
        .collect();
    let direct: Vec<String> = h.strokes()[3..].iter().map(|s| s.id.clone()).collect();
    assert_eq!(replayed, direct);
    assert_eq!(from_log, direct);
}

#[test]
fn new_stroke_after_undo_destroys_redo_tail() {
    let mut h = HistoryManager::new(32, 32).unwrap();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(h.add_stroke(dot(3.0 + 5.0 * i as f32, 3.0), None).unwrap().id);
    }
    for _ in 0..2 {
        h.undo();
    }
    h.add_stroke(dot(16.0, 16.0), None).unwrap();

    let state = h.state();
    assert!(!state.can_redo);
    assert_eq!(state.stroke_count, 5 - 2 + 1);
    assert!(h.strokes().iter().all(|s| s.id != ids[3] && s.id != ids[4]));
    assert!(h.redo().is_none());
}

#[test]
fn clear_returns_to_empty() {
    let mut h = HistoryManager::new(16, 16).unwrap();
    h.add_stroke(dot(4.0, 4.0), None).unwrap();
    h.create_full_checkpoint(&[0u8; 256]).unwrap();
    h.clear();
    assert_eq!(h.state().stroke_count, 0);
    assert_eq!(h.state().current_index, -1);
    assert_eq!(h.checkpoint_count(), 0);
    assert!(h.validate_integrity().is_valid);
}

#[test]
fn invalid_input_is_rejected_at_the_boundary() {
    assert!(HistoryManager::new(0, 10).is_err());
    let bad_tiles = HistoryConfig {
        tile_size: 0,
        ..HistoryConfig::default()
    };
    assert!(HistoryManager::with_config(10, 10, bad_tiles).is_err());

    let mut h = HistoryManager::new(10, 10).unwrap();
    assert!(h.add_stroke(NewStroke::new(vec![], 4.0, StrokeMode::Paint), None).is_err());
    assert!(h.add_stroke(NewStroke::new(vec![(1.0, 1.0)], -2.0, StrokeMode::Paint), None).is_err());
    assert!(h.create_full_checkpoint(&[0u8; 7]).is_err());
    assert_eq!(h.state().stroke_count, 0);
}
