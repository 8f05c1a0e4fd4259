// Integration test for the project model
// Sequences, patterns, notifications, playback export and generated sequences

use mymusic_sequencer::midi::MidiEvent;
use mymusic_sequencer::project::serialization::{deserialize_from_ron, serialize_to_ron};
use mymusic_sequencer::project::{Project, ProjectListener, SerializedData};
use mymusic_sequencer::sequencer::sequence::NullDispatcher;
use mymusic_sequencer::sequencer::{
    Clip, Event, Modifier, ModifierKind, Pattern, Sequence, Track,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::rc::Rc;

/// Records notifications as short strings, in delivery order
struct Recorder(Rc<RefCell<Vec<String>>>);

impl ProjectListener for Recorder {
    fn on_add_event(&mut self, track_id: &str, event: &Event) {
        self.0.borrow_mut().push(format!("add_event {} {}", track_id, event.id()));
    }

    fn on_change_event(&mut self, _track_id: &str, old: &Event, new: &Event) {
        self.0
            .borrow_mut()
            .push(format!("change_event {} {}->{}", old.id(), old.beat(), new.beat()));
    }

    fn on_remove_event(&mut self, _track_id: &str, event: &Event) {
        self.0.borrow_mut().push(format!("remove_event {}", event.id()));
    }

    fn on_post_remove_event(&mut self, _track_id: &str) {
        self.0.borrow_mut().push("post_remove_event".to_string());
    }

    fn on_remove_clip(&mut self, _track_id: &str, clip: &Clip) {
        self.0.borrow_mut().push(format!("remove_clip {}", clip.id()));
    }

    fn on_change_track_beat_range(&mut self, track_id: &str) {
        self.0.borrow_mut().push(format!("track_range {}", track_id));
    }

    fn on_add_track(&mut self, track_id: &str) {
        self.0.borrow_mut().push(format!("add_track {}", track_id));
    }

    fn on_change_project_beat_range(&mut self, _first_beat: f32, _last_beat: f32) {
        self.0.borrow_mut().push("project_range".to_string());
    }

    fn on_reload_generated_sequence(
        &mut self,
        _track_id: &str,
        clip: &Clip,
        sequence: Option<&Sequence>,
    ) {
        let state = if sequence.is_some() { "rebuilt" } else { "removed" };
        self.0
            .borrow_mut()
            .push(format!("generated {} {}", clip.id(), state));
    }
}

fn project_with_track() -> Project {
    let mut project = Project::default();
    project.add_track(Track::with_id("t", "Lead"), false);
    project
}

fn recorded(project: &mut Project) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    project.add_listener(Box::new(Recorder(log.clone())));
    log
}

fn clip_ids(pattern: &Pattern) -> Vec<(String, f32)> {
    pattern
        .clips()
        .iter()
        .map(|c| (c.id().to_string(), c.beat()))
        .collect()
}

#[test]
fn test_first_insert_sets_beat_range() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("1", 2.0, 60, 1.0, 1.0), false);

    let sequence = project.track("t").unwrap().sequence();
    assert_eq!(sequence.first_beat(), 2.0);
    assert_eq!(sequence.last_beat(), 2.0);
}

#[test]
fn test_changed_clip_moves_to_sorted_position() {
    let mut pattern = Pattern::new();
    let mut dispatcher = NullDispatcher;
    pattern.insert(Clip::new("a", 0.0), &mut dispatcher);

    assert!(pattern.insert(Clip::new("b", 4.0), &mut dispatcher));
    assert_eq!(
        clip_ids(&pattern),
        vec![("a".to_string(), 0.0), ("b".to_string(), 4.0)]
    );

    let a = Clip::new("a", 0.0);
    assert!(pattern.change(&a, a.with_beat(5.0), &mut dispatcher));
    assert_eq!(
        clip_ids(&pattern),
        vec![("b".to_string(), 4.0), ("a".to_string(), 5.0)]
    );
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let mut project = project_with_track();
    assert!(project.insert_event("t", Event::note("n", 0.0, 60, 1.0, 1.0), false));
    assert!(!project.insert_event("t", Event::note("n", 4.0, 62, 1.0, 1.0), false));
    assert!(!project.add_track(Track::with_id("t", "Again"), false));
    assert!(!project.insert_event("missing", Event::note("x", 0.0, 60, 1.0, 1.0), false));
}

#[test]
fn test_notifications_arrive_depth_first() {
    let mut project = project_with_track();
    let log = recorded(&mut project);

    let note = Event::note("n", 1.0, 60, 1.0, 1.0);
    project.insert_event("t", note.clone(), false);
    // Same beat, same range: no range notification
    project.change_event("t", &note, note.with_key(62), false);
    project.remove_event("t", &note.with_key(62), false);

    assert_eq!(
        *log.borrow(),
        vec![
            "add_event t n",
            "track_range t",
            "change_event n 1->1",
            "remove_event n",
            "post_remove_event",
            "track_range t",
        ]
    );
}

#[test]
fn test_removed_listener_hears_nothing() {
    let mut project = Project::default();
    let log = Rc::new(RefCell::new(Vec::new()));
    let id = project.add_listener(Box::new(Recorder(log.clone())));

    project.add_track(Track::with_id("t", "Lead"), false);
    assert!(project.remove_listener(id));
    project.insert_event("t", Event::note("n", 0.0, 60, 1.0, 1.0), false);

    assert_eq!(*log.borrow(), vec!["add_track t", "project_range"]);
    assert!(!project.remove_listener(id));
}

#[test]
fn test_export_is_cached_until_next_edit() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);

    let first = project.export_sequence("t").unwrap().to_vec();
    let second = project.export_sequence("t").unwrap().to_vec();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
    assert!(matches!(first[0].event, MidiEvent::NoteOn { note: 60, .. }));
    assert!(matches!(first[1].event, MidiEvent::NoteOff { note: 60 }));
    assert!(!project.track("t").unwrap().sequence().is_export_outdated());

    project.insert_event("t", Event::note("b", 2.0, 64, 1.0, 1.0), false);
    assert!(project.track("t").unwrap().sequence().is_export_outdated());
    assert_eq!(project.export_sequence("t").unwrap().len(), 4);
}

#[test]
fn test_generated_sequence_lifecycle() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    let log = recorded(&mut project);

    let clip = Clip::new("g", 8.0).with_appended_modifier(Modifier::new(ModifierKind::Transpose(12)));
    project.insert_clip("t", clip.clone(), false);

    // Scheduled, not built yet
    assert!(project.has_pending_generated_updates());
    assert!(project.generated_sequence("t", "g").is_none());

    assert_eq!(project.flush_generated_sequences(), 1);
    assert!(!project.has_pending_generated_updates());
    let keys: Vec<i32> = project
        .generated_sequence("t", "g")
        .unwrap()
        .events()
        .iter()
        .filter_map(|e| e.as_note().map(|n| n.key))
        .collect();
    assert_eq!(keys, vec![72]);

    // Base edits reach the generated copy on the next flush
    project.insert_event("t", Event::note("b", 1.0, 62, 1.0, 1.0), false);
    project.insert_event("t", Event::note("c", 2.0, 64, 1.0, 1.0), false);
    assert_eq!(project.flush_generated_sequences(), 1);
    assert_eq!(project.generated_sequence("t", "g").unwrap().len(), 3);

    // Removal evicts right away, without a flush
    log.borrow_mut().clear();
    project.remove_clip("t", &clip, false);
    assert!(project.generated_sequence("t", "g").is_none());
    assert!(!project.has_pending_generated_updates());
    assert_eq!(log.borrow()[0], "generated g removed");
    assert_eq!(log.borrow()[1], "remove_clip g");
}

#[test]
fn test_flush_rebuilds_from_live_clip() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    let log = recorded(&mut project);

    let clip = Clip::new("g", 0.0).with_appended_modifier(Modifier::new(ModifierKind::Transpose(1)));
    project.insert_clip("t", clip.clone(), false);
    let moved = clip.with_beat(4.0);
    project.change_clip("t", &clip, moved.clone(), false);
    project.change_clip("t", &moved, moved.with_beat(8.0), false);

    // Three schedules, one rebuild, one project range notification
    log.borrow_mut().clear();
    assert_eq!(project.flush_generated_sequences(), 1);
    assert_eq!(*log.borrow(), vec!["generated g rebuilt", "project_range"]);
}

fn transposed(id: &str, beat: f32) -> Clip {
    Clip::new(id, beat).with_appended_modifier(Modifier::new(ModifierKind::Transpose(12)))
}

fn generated_keys(project: &Project, clip_id: &str) -> Option<Vec<i32>> {
    project.generated_sequence("t", clip_id).map(|sequence| {
        sequence
            .events()
            .iter()
            .filter_map(|e| e.as_note().map(|n| n.key))
            .collect()
    })
}

#[test]
fn test_checkout_evicts_generated_of_dropped_clips() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    let snapshot = project.track_snapshot("t").unwrap();

    project.insert_clip("t", transposed("m", 8.0), false);
    project.flush_generated_sequences();
    assert!(project.generated_sequence("t", "m").is_some());

    let log = recorded(&mut project);
    project.checkout_track("t", &snapshot).unwrap();

    assert!(project.track("t").unwrap().pattern().get("m").is_none());
    assert!(project.generated_sequence("t", "m").is_none());
    assert!(log.borrow().contains(&"generated m removed".to_string()));

    project.flush_generated_sequences();
    assert!(project.generated_sequence("t", "m").is_none());
}

#[test]
fn test_undone_track_removal_rebuilds_generated() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    project.insert_clip("t", transposed("m", 8.0), false);
    project.flush_generated_sequences();

    project.checkpoint();
    assert!(project.remove_track("t", true));
    assert!(project.generated_sequence("t", "m").is_none());

    assert!(project.undo());
    assert!(project.has_pending_generated_updates());
    assert_eq!(project.flush_generated_sequences(), 1);
    assert_eq!(generated_keys(&project, "m"), Some(vec![72]));
}

#[test]
fn test_loaded_project_builds_generated() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    project.insert_clip("t", transposed("m", 8.0), false);

    let mut loaded = Project::default();
    loaded.deserialize(&project.serialize()).unwrap();

    assert!(loaded.has_pending_generated_updates());
    assert_eq!(loaded.flush_generated_sequences(), 1);
    assert_eq!(generated_keys(&loaded, "m"), Some(vec![72]));
}

#[test]
fn test_checkout_replaces_track_contents() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 1.0), false);
    let snapshot = project.track_snapshot("t").unwrap();

    project.insert_event("t", Event::note("b", 4.0, 60, 1.0, 1.0), false);
    project.rename_track("t", "Renamed", false);

    project.checkout_track("t", &snapshot).unwrap();
    let track = project.track("t").unwrap();
    assert_eq!(track.name(), "Lead");
    assert_eq!(track.sequence().len(), 1);
    assert!(track.sequence().get("b").is_none());
}

#[test]
fn test_project_document_on_disk() {
    let mut project = project_with_track();
    project.insert_event("t", Event::note("a", 0.0, 60, 1.0, 0.5), false);
    project.insert_event("t", Event::annotation("m", 4.0, "Chorus", Default::default()), false);
    project.insert_clip("t", Clip::new("c", 16.0).with_key(-3), false);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("song.ron");
    std::fs::write(&path, serialize_to_ron(&project.serialize()).unwrap()).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let data: SerializedData = deserialize_from_ron(&text).unwrap();

    let mut loaded = Project::default();
    loaded.deserialize(&data).unwrap();

    let original = project.track("t").unwrap();
    let restored = loaded.track("t").unwrap();
    assert_eq!(restored.name(), original.name());
    assert_eq!(restored.sequence().events(), original.sequence().events());
    assert_eq!(restored.pattern().clips(), original.pattern().clips());
}

#[test]
fn test_random_edits_keep_collections_sorted() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut sequence = Sequence::new();
    let mut pattern = Pattern::new();
    let mut dispatcher = NullDispatcher;

    for _ in 0..500 {
        let beat = rng.gen_range(0..64) as f32 * 0.25;
        match rng.gen_range(0..3) {
            0 => {
                let id = sequence.create_unique_event_id();
                sequence.insert(Event::note(id, beat, rng.gen_range(0..128), 1.0, 1.0), &mut dispatcher);
                let id = pattern.create_unique_clip_id();
                pattern.insert(Clip::new(id, beat), &mut dispatcher);
            }
            1 if !sequence.is_empty() => {
                let index = rng.gen_range(0..sequence.len());
                let event = sequence.events()[index].clone();
                assert!(sequence.remove(&event, &mut dispatcher));
            }
            _ if !pattern.is_empty() => {
                let index = rng.gen_range(0..pattern.len());
                let clip = pattern.clips()[index].clone();
                assert!(pattern.change(&clip, clip.with_beat(beat), &mut dispatcher));
            }
            _ => {}
        }

        assert!(sequence.is_sorted());
        assert!(pattern.is_sorted());
    }
}
