use super::*;
use crate::raster::PristineSource;
use crate::test_support::figure_with;
use proptest::prelude::*;

fn manager(limit: usize) -> HistoryManager {
    HistoryManager::new(limit, FontCache::offline().shared())
}

fn project() -> Project {
    Project::from_figures(vec![figure_with(2, 40, 30)], 0)
}

fn set_brightness(project: &mut Project, value: f64) {
    project.figures[0].panels[0].edits.brightness = value;
}

fn brightness(project: &Project) -> f64 {
    project.figures[0].panels[0].edits.brightness
}

#[test]
fn undo_with_single_entry_is_a_no_op() {
    let mut history = manager(30);
    let mut p = project();
    assert!(history.commit(&p));

    assert!(!history.undo());
    assert_eq!(history.undo_count(), 1);
    assert_eq!(history.redo_count(), 0);
    assert!(!history.is_restoring());
    assert!(matches!(history.poll(&mut p), RestoreStatus::Idle));
}

#[test]
fn forty_commits_keep_the_newest_thirty() {
    let mut history = manager(30);
    let mut p = project();
    for i in 0..40 {
        set_brightness(&mut p, i as f64);
        assert!(history.commit(&p));
    }
    assert_eq!(history.undo_count(), 30);

    let mut undone = 0;
    while history.undo() {
        assert!(matches!(history.finish_restore(&mut p), RestoreStatus::Applied));
        undone += 1;
    }
    assert_eq!(undone, 29);
    // Snapshots 0..=9 were evicted.
    assert_eq!(brightness(&p), 10.0);
}

#[test]
fn undo_then_redo_returns_to_the_same_state() {
    let mut history = manager(30);
    let mut p = project();
    history.commit(&p);
    let before = ProjectSnapshot::capture(&p);

    set_brightness(&mut p, 150.0);
    p.figures[0].panels[1].edits.rotation = 90.0;
    history.commit(&p);
    let after = ProjectSnapshot::capture(&p);

    assert!(history.undo());
    assert!(history.is_restoring());
    assert!(matches!(history.finish_restore(&mut p), RestoreStatus::Applied));
    assert!(!history.is_restoring());
    assert_eq!(ProjectSnapshot::capture(&p), before);
    assert!(p.figures[0].panels.iter().all(|panel| panel.baked.is_some()));

    assert!(history.redo());
    assert!(matches!(history.finish_restore(&mut p), RestoreStatus::Applied));
    assert_eq!(ProjectSnapshot::capture(&p), after);
    // Rotation by 90 keeps the buffer size.
    assert_eq!(p.figures[0].panels[1].original_width, 40);
}

#[test]
fn commits_are_ignored_while_restoring() {
    let mut history = manager(30);
    let mut p = project();
    history.commit(&p);
    set_brightness(&mut p, 120.0);
    history.commit(&p);

    assert!(history.undo());
    assert!(!history.commit(&p));
    assert!(!history.undo());
    assert!(!history.redo());
    history.finish_restore(&mut p);

    assert_eq!(history.undo_count(), 1);
    assert_eq!(history.redo_count(), 1);
    assert!(history.commit(&p));
    assert_eq!(history.redo_count(), 0);
}

#[test]
fn new_commit_clears_redo() {
    let mut history = manager(30);
    let mut p = project();
    history.commit(&p);
    set_brightness(&mut p, 80.0);
    history.commit(&p);
    history.undo();
    history.finish_restore(&mut p);
    assert!(history.can_redo());

    set_brightness(&mut p, 60.0);
    history.commit(&p);
    assert!(!history.can_redo());
}

#[test]
fn failed_restore_rolls_back_and_keeps_project() {
    let mut history = manager(30);
    let mut p = project();
    let good = p.figures[0].panels[0].pristine.clone();
    p.figures[0].panels[0].pristine = PristineSource::new(b"corrupt".to_vec(), "broken.png", "image/png");
    history.commit(&p);
    p.figures[0].panels[0].pristine = good;
    set_brightness(&mut p, 130.0);
    history.commit(&p);

    assert!(history.undo());
    match history.finish_restore(&mut p) {
        RestoreStatus::Failed(e) => assert_eq!(e.filename, "broken.png"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(brightness(&p), 130.0);
    assert_eq!(history.undo_count(), 2);
    assert_eq!(history.redo_count(), 0);
    assert!(!history.is_restoring());
}

#[test]
fn restore_switches_active_figure() {
    let mut history = manager(30);
    let mut p = project();
    history.commit(&p);
    p.add_figure("Figure 2");
    history.commit(&p);
    assert_eq!(p.active_figure_index, 1);

    history.undo();
    history.finish_restore(&mut p);
    assert_eq!(p.figures.len(), 1);
    assert_eq!(p.active_figure_index, 0);
}

#[test]
fn poll_eventually_applies() {
    let mut history = manager(30);
    let mut p = project();
    history.commit(&p);
    set_brightness(&mut p, 90.0);
    history.commit(&p);
    history.undo();
    loop {
        match history.poll(&mut p) {
            RestoreStatus::Pending => std::thread::yield_now(),
            RestoreStatus::Applied => break,
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(brightness(&p), 100.0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn history_never_exceeds_limit(limit in 2usize..12, commits in 0usize..40) {
        let mut history = manager(limit);
        let mut p = project();
        for i in 0..commits {
            set_brightness(&mut p, i as f64);
            history.commit(&p);
        }
        prop_assert!(history.undo_count() <= limit);
        prop_assert_eq!(history.undo_count(), commits.min(limit));
    }

    #[test]
    fn undo_redo_is_identity(values in proptest::collection::vec(0.0f64..200.0, 2..6)) {
        let mut history = manager(30);
        let mut p = project();
        for v in &values {
            set_brightness(&mut p, *v);
            history.commit(&p);
        }
        let top = ProjectSnapshot::capture(&p);
        prop_assert!(history.undo());
        history.finish_restore(&mut p);
        prop_assert!(history.redo());
        history.finish_restore(&mut p);
        prop_assert_eq!(ProjectSnapshot::capture(&p), top);
    }
}
