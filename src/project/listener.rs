// Project listeners - one-way change notifications out of the model
//
// Flow: Sequence/Pattern -> EventDispatcher (the owning track) -> ProjectListener fan-out.
//
// Every notification is synchronous and one-way: it is delivered depth-first
// before the mutating call returns, nothing is returned to the model, and
// listeners must not block. Listeners get ids and values, never a live
// reference into the tree, and re-query the project afterwards if they need more.

use crate::sequencer::clip::Clip;
use crate::sequencer::event::Event;
use crate::sequencer::generated::GeneratedSequences;
use crate::sequencer::sequence::Sequence;

/// Receiver of project-wide change notifications
///
/// All methods default to no-ops so a listener only implements what it uses.
pub trait ProjectListener {
    fn on_add_event(&mut self, _track_id: &str, _event: &Event) {}

    /// Carries both versions so the receiver can diff instead of remove + add
    fn on_change_event(&mut self, _track_id: &str, _old: &Event, _new: &Event) {}

    /// Sent right before the event leaves the sequence
    fn on_remove_event(&mut self, _track_id: &str, _event: &Event) {}

    /// Sent once the removal (single or group) is done
    fn on_post_remove_event(&mut self, _track_id: &str) {}

    /// The whole event list was replaced (checkout, bulk import)
    fn on_reload_sequence(&mut self, _track_id: &str) {}

    fn on_add_clip(&mut self, _track_id: &str, _clip: &Clip) {}

    fn on_change_clip(&mut self, _track_id: &str, _old: &Clip, _new: &Clip) {}

    fn on_remove_clip(&mut self, _track_id: &str, _clip: &Clip) {}

    fn on_post_remove_clip(&mut self, _track_id: &str) {}

    /// The whole clip list was replaced
    fn on_reload_pattern(&mut self, _track_id: &str) {}

    /// Name, colour, channel, instrument, mute or time signature changed
    fn on_change_track_properties(&mut self, _track_id: &str) {}

    fn on_change_track_beat_range(&mut self, _track_id: &str) {}

    fn on_add_track(&mut self, _track_id: &str) {}

    /// Sent right before the track is dropped
    fn on_remove_track(&mut self, _track_id: &str) {}

    fn on_change_project_beat_range(&mut self, _first_beat: f32, _last_beat: f32) {}

    /// A generated sequence was rebuilt (`Some`) or evicted (`None`)
    fn on_reload_generated_sequence(
        &mut self,
        _track_id: &str,
        _clip: &Clip,
        _sequence: Option<&Sequence>,
    ) {
    }
}

/// What a sequence or pattern talks to when it changes
///
/// Implemented by the owning track; it knows nothing about the track itself,
/// which is why these methods carry no track id.
pub trait EventDispatcher {
    fn dispatch_add_event(&mut self, event: &Event);
    fn dispatch_change_event(&mut self, old: &Event, new: &Event);
    fn dispatch_remove_event(&mut self, event: &Event);
    fn dispatch_post_remove_event(&mut self);
    fn dispatch_reload_sequence(&mut self);

    fn dispatch_add_clip(&mut self, clip: &Clip);
    fn dispatch_change_clip(&mut self, old: &Clip, new: &Clip);
    fn dispatch_remove_clip(&mut self, clip: &Clip);
    fn dispatch_post_remove_clip(&mut self);
    fn dispatch_reload_pattern(&mut self);

    fn dispatch_change_track_properties(&mut self);
    fn dispatch_change_track_beat_range(&mut self);
}

/// Track-side dispatcher: adds the track id and forwards, nothing else
pub struct TrackDispatcher<'a> {
    track_id: &'a str,
    listener: &'a mut dyn ProjectListener,
}

impl<'a> TrackDispatcher<'a> {
    pub fn new(track_id: &'a str, listener: &'a mut dyn ProjectListener) -> Self {
        Self { track_id, listener }
    }
}

impl EventDispatcher for TrackDispatcher<'_> {
    fn dispatch_add_event(&mut self, event: &Event) {
        self.listener.on_add_event(self.track_id, event);
    }

    fn dispatch_change_event(&mut self, old: &Event, new: &Event) {
        self.listener.on_change_event(self.track_id, old, new);
    }

    fn dispatch_remove_event(&mut self, event: &Event) {
        self.listener.on_remove_event(self.track_id, event);
    }

    fn dispatch_post_remove_event(&mut self) {
        self.listener.on_post_remove_event(self.track_id);
    }

    fn dispatch_reload_sequence(&mut self) {
        self.listener.on_reload_sequence(self.track_id);
    }

    fn dispatch_add_clip(&mut self, clip: &Clip) {
        self.listener.on_add_clip(self.track_id, clip);
    }

    fn dispatch_change_clip(&mut self, old: &Clip, new: &Clip) {
        self.listener.on_change_clip(self.track_id, old, new);
    }

    fn dispatch_remove_clip(&mut self, clip: &Clip) {
        self.listener.on_remove_clip(self.track_id, clip);
    }

    fn dispatch_post_remove_clip(&mut self) {
        self.listener.on_post_remove_clip(self.track_id);
    }

    fn dispatch_reload_pattern(&mut self) {
        self.listener.on_reload_pattern(self.track_id);
    }

    fn dispatch_change_track_properties(&mut self) {
        self.listener.on_change_track_properties(self.track_id);
    }

    fn dispatch_change_track_beat_range(&mut self) {
        self.listener.on_change_track_beat_range(self.track_id);
    }
}

/// Handle returned by `ListenerList::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Ordered subscription list; notifications go out in registration order
#[derive(Default)]
pub struct ListenerList {
    listeners: Vec<(ListenerId, Box<dyn ProjectListener>)>,
    next_id: u64,
}

impl ListenerList {
    pub fn add(&mut self, listener: Box<dyn ProjectListener>) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut dyn ProjectListener)) {
        for (_, listener) in self.listeners.iter_mut() {
            f(listener.as_mut());
        }
    }
}

impl ProjectListener for ListenerList {
    fn on_add_event(&mut self, track_id: &str, event: &Event) {
        log::trace!(target: "project", "add event {} on {}", event.id(), track_id);
        self.for_each(|l| l.on_add_event(track_id, event));
    }

    fn on_change_event(&mut self, track_id: &str, old: &Event, new: &Event) {
        log::trace!(target: "project", "change event {} on {}", new.id(), track_id);
        self.for_each(|l| l.on_change_event(track_id, old, new));
    }

    fn on_remove_event(&mut self, track_id: &str, event: &Event) {
        log::trace!(target: "project", "remove event {} on {}", event.id(), track_id);
        self.for_each(|l| l.on_remove_event(track_id, event));
    }

    fn on_post_remove_event(&mut self, track_id: &str) {
        self.for_each(|l| l.on_post_remove_event(track_id));
    }

    fn on_reload_sequence(&mut self, track_id: &str) {
        self.for_each(|l| l.on_reload_sequence(track_id));
    }

    fn on_add_clip(&mut self, track_id: &str, clip: &Clip) {
        self.for_each(|l| l.on_add_clip(track_id, clip));
    }

    fn on_change_clip(&mut self, track_id: &str, old: &Clip, new: &Clip) {
        self.for_each(|l| l.on_change_clip(track_id, old, new));
    }

    fn on_remove_clip(&mut self, track_id: &str, clip: &Clip) {
        self.for_each(|l| l.on_remove_clip(track_id, clip));
    }

    fn on_post_remove_clip(&mut self, track_id: &str) {
        self.for_each(|l| l.on_post_remove_clip(track_id));
    }

    fn on_reload_pattern(&mut self, track_id: &str) {
        self.for_each(|l| l.on_reload_pattern(track_id));
    }

    fn on_change_track_properties(&mut self, track_id: &str) {
        self.for_each(|l| l.on_change_track_properties(track_id));
    }

    fn on_change_track_beat_range(&mut self, track_id: &str) {
        self.for_each(|l| l.on_change_track_beat_range(track_id));
    }

    fn on_add_track(&mut self, track_id: &str) {
        self.for_each(|l| l.on_add_track(track_id));
    }

    fn on_remove_track(&mut self, track_id: &str) {
        self.for_each(|l| l.on_remove_track(track_id));
    }

    fn on_change_project_beat_range(&mut self, first_beat: f32, last_beat: f32) {
        self.for_each(|l| l.on_change_project_beat_range(first_beat, last_beat));
    }

    fn on_reload_generated_sequence(
        &mut self,
        track_id: &str,
        clip: &Clip,
        sequence: Option<&Sequence>,
    ) {
        self.for_each(|l| l.on_reload_generated_sequence(track_id, clip, sequence));
    }
}

/// Project-level fan-out
///
/// The generated-sequence cache sees every notification first so it can
/// schedule rebuilds, then the registered listeners get it. Cache entries
/// evicted by a removal are announced right away, inside the same call.
#[derive(Default)]
pub struct ProjectBroadcaster {
    pub(crate) listeners: ListenerList,
    pub(crate) generated: GeneratedSequences,
}

impl ProjectBroadcaster {
    pub fn listeners(&self) -> &ListenerList {
        &self.listeners
    }

    pub fn generated(&self) -> &GeneratedSequences {
        &self.generated
    }

    pub(crate) fn announce_evictions(&mut self) {
        for (track_id, clip) in self.generated.take_evicted() {
            self.listeners
                .on_reload_generated_sequence(&track_id, &clip, None);
        }
    }
}

impl ProjectListener for ProjectBroadcaster {
    fn on_add_event(&mut self, track_id: &str, event: &Event) {
        self.generated.on_add_event(track_id, event);
        self.listeners.on_add_event(track_id, event);
    }

    fn on_change_event(&mut self, track_id: &str, old: &Event, new: &Event) {
        self.generated.on_change_event(track_id, old, new);
        self.listeners.on_change_event(track_id, old, new);
    }

    fn on_remove_event(&mut self, track_id: &str, event: &Event) {
        self.generated.on_remove_event(track_id, event);
        self.listeners.on_remove_event(track_id, event);
    }

    fn on_post_remove_event(&mut self, track_id: &str) {
        self.listeners.on_post_remove_event(track_id);
    }

    fn on_reload_sequence(&mut self, track_id: &str) {
        self.generated.on_reload_sequence(track_id);
        self.listeners.on_reload_sequence(track_id);
    }

    fn on_add_clip(&mut self, track_id: &str, clip: &Clip) {
        self.generated.on_add_clip(track_id, clip);
        self.listeners.on_add_clip(track_id, clip);
    }

    fn on_change_clip(&mut self, track_id: &str, old: &Clip, new: &Clip) {
        self.generated.on_change_clip(track_id, old, new);
        self.listeners.on_change_clip(track_id, old, new);
    }

    fn on_remove_clip(&mut self, track_id: &str, clip: &Clip) {
        self.generated.on_remove_clip(track_id, clip);
        self.announce_evictions();
        self.listeners.on_remove_clip(track_id, clip);
    }

    fn on_post_remove_clip(&mut self, track_id: &str) {
        self.listeners.on_post_remove_clip(track_id);
    }

    fn on_reload_pattern(&mut self, track_id: &str) {
        self.generated.on_reload_pattern(track_id);
        self.listeners.on_reload_pattern(track_id);
    }

    fn on_change_track_properties(&mut self, track_id: &str) {
        self.listeners.on_change_track_properties(track_id);
    }

    fn on_change_track_beat_range(&mut self, track_id: &str) {
        self.listeners.on_change_track_beat_range(track_id);
    }

    fn on_add_track(&mut self, track_id: &str) {
        self.generated.on_add_track(track_id);
        self.listeners.on_add_track(track_id);
    }

    fn on_remove_track(&mut self, track_id: &str) {
        self.generated.on_remove_track(track_id);
        self.announce_evictions();
        self.listeners.on_remove_track(track_id);
    }

    fn on_change_project_beat_range(&mut self, first_beat: f32, last_beat: f32) {
        self.listeners
            .on_change_project_beat_range(first_beat, last_beat);
    }

    fn on_reload_generated_sequence(
        &mut self,
        track_id: &str,
        clip: &Clip,
        sequence: Option<&Sequence>,
    ) {
        self.listeners
            .on_reload_generated_sequence(track_id, clip, sequence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl ProjectListener for Recorder {
        fn on_add_event(&mut self, track_id: &str, event: &Event) {
            self.log
                .borrow_mut()
                .push(format!("{}:add:{}:{}", self.name, track_id, event.id()));
        }

        fn on_change_track_properties(&mut self, track_id: &str) {
            self.log
                .borrow_mut()
                .push(format!("{}:props:{}", self.name, track_id));
        }
    }

    #[test]
    fn test_track_dispatcher_adds_track_id() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut recorder = Recorder {
            name: "r",
            log: log.clone(),
        };

        let mut dispatcher = TrackDispatcher::new("t1", &mut recorder);
        dispatcher.dispatch_add_event(&Event::note("n", 0.0, 60, 1.0, 1.0));
        dispatcher.dispatch_change_track_properties();

        assert_eq!(*log.borrow(), vec!["r:add:t1:n", "r:props:t1"]);
    }

    #[test]
    fn test_listeners_called_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::default();
        list.add(Box::new(Recorder {
            name: "first",
            log: log.clone(),
        }));
        list.add(Box::new(Recorder {
            name: "second",
            log: log.clone(),
        }));

        list.on_change_track_properties("t");

        assert_eq!(*log.borrow(), vec!["first:props:t", "second:props:t"]);
    }

    #[test]
    fn test_remove_listener() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut list = ListenerList::default();
        let id = list.add(Box::new(Recorder {
            name: "gone",
            log: log.clone(),
        }));

        assert!(list.remove(id));
        assert!(!list.remove(id));
        assert!(list.is_empty());

        list.on_change_track_properties("t");
        assert!(log.borrow().is_empty());
    }
}
