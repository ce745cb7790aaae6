//! Input mapping engine: device lines and elapsed time in, key actions out.
//!
//! Each distinct key string owns exactly one [`KeyState`], shared by every
//! mapping that targets the key. Two state machines drive it:
//!
//! **Digital**: a bare pin line presses the key, or refreshes its activity
//! stamp if it is already pressed. The device repeats the line while the
//! contact stays closed, so silence longer than the maximum hold time is
//! read as a release by [`MappingEngine::check_timeouts`].
//!
//! **Analog**: every sample is checked against the rules on the pin, once
//! per key. A key is in range when any of its rules contains the value. An
//! in-range value starts (or continues) a dwell timer and presses the key
//! once the hold time has elapsed; an out-of-range value releases the key
//! and restarts the dwell from scratch. Analog keys are never released by
//! the timeout sweep.

use std::collections::HashMap;

use embassy_time::{Duration, Instant};
use keymap_proto::{parse_line, DeviceLine, ParseError};
use log::{debug, info, trace, warn};

use crate::mapping::{KeyMap, PinMapping};
use crate::sink::KeySink;

/// Default silence after which a digitally pressed key is released.
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_millis(100);

/// Which kind of mapping pressed a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressSource {
    Digital,
    Analog,
}

/// Per-key state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyState {
    /// Whether the engine has pressed the key and not yet released it.
    pub pressed: bool,
    /// Last press or "still held" signal.
    pub last_activity: Option<Instant>,
    /// When an analog value most recently entered a band without having
    /// satisfied the dwell yet.
    pub range_entered: Option<Instant>,
    /// Mapping kind responsible for the current press.
    pub source: Option<PressSource>,
}

/// Converts device lines into key presses and releases.
pub struct MappingEngine<K> {
    keymap: KeyMap,
    states: HashMap<String, KeyState>,
    sink: K,
    max_hold: Duration,
}

impl<K: KeySink> MappingEngine<K> {
    /// Create an engine over the given mappings, with one state per key.
    pub fn new(keymap: KeyMap, sink: K) -> Self {
        let mut states = HashMap::new();
        for (_, mapping) in keymap.iter() {
            for key in mapping.keys() {
                states.entry(key.to_owned()).or_insert_with(KeyState::default);
            }
        }

        Self {
            keymap,
            states,
            sink,
            max_hold: DEFAULT_MAX_HOLD,
        }
    }

    /// Override the digital auto-release timeout.
    #[must_use]
    pub fn with_max_hold(mut self, max_hold: Duration) -> Self {
        self.max_hold = max_hold;
        self
    }

    #[must_use]
    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    #[must_use]
    pub fn max_hold(&self) -> Duration {
        self.max_hold
    }

    /// State of a key, if any mapping references it.
    #[must_use]
    pub fn key_state(&self, key: &str) -> Option<&KeyState> {
        self.states.get(key)
    }

    #[must_use]
    pub fn is_pressed(&self, key: &str) -> bool {
        self.states.get(key).is_some_and(|state| state.pressed)
    }

    /// Keys currently held down.
    pub fn pressed_keys(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(|(_, state)| state.pressed)
            .map(|(key, _)| key.as_str())
    }

    /// Get a reference to the key sink.
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Get a mutable reference to the key sink.
    pub fn sink_mut(&mut self) -> &mut K {
        &mut self.sink
    }

    /// Process one data line from the device.
    ///
    /// Lines for pins without a mapping, and lines whose shape does not
    /// match the pin's mapping kind, are ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ParseError`] for malformed lines; no key changes state.
    pub fn handle_line(&mut self, line: &str, now: Instant) -> Result<(), ParseError> {
        match parse_line(line)? {
            DeviceLine::Digital(pin) => match self.keymap.get(pin) {
                Some(PinMapping::Digital { key }) => {
                    if let Some(state) = self.states.get_mut(key) {
                        on_digital_event(&mut self.sink, key, state, now);
                    }
                }
                Some(PinMapping::Analog { .. }) => {
                    debug!("Digital event on analog pin {} ignored", pin);
                }
                None => trace!("Event on unmapped pin {}", pin),
            },
            DeviceLine::Analog { pin, value } => {
                trace!("Analog {} = {}", pin, value);
                match self.keymap.get(pin) {
                    Some(PinMapping::Analog { rules }) => {
                        for (i, rule) in rules.iter().enumerate() {
                            // One transition per key, even when several rules share it.
                            if rules[..i].iter().any(|earlier| earlier.key == rule.key) {
                                continue;
                            }
                            let dwell = rules
                                .iter()
                                .filter(|r| r.key == rule.key && r.contains(value))
                                .map(|r| r.hold_required)
                                .min();
                            if let Some(state) = self.states.get_mut(&rule.key) {
                                on_analog_sample(&mut self.sink, &rule.key, dwell, state, now);
                            }
                        }
                    }
                    Some(PinMapping::Digital { .. }) => {
                        debug!("Analog sample on digital pin {} ignored", pin);
                    }
                    None => trace!("Sample on unmapped pin {}", pin),
                }
            }
            DeviceLine::Ack | DeviceLine::Rejected(_) => {
                trace!("Reply {:?} outside a confirmed send ignored", line);
            }
        }
        Ok(())
    }

    /// Release digitally pressed keys whose heartbeat went silent.
    ///
    /// A key is released once more than the maximum hold time has passed
    /// since its last activity. Returns the number of keys released.
    pub fn check_timeouts(&mut self, now: Instant) -> usize {
        let mut released = 0;
        for (key, state) in &mut self.states {
            if !state.pressed || state.source != Some(PressSource::Digital) {
                continue;
            }
            let Some(last) = state.last_activity else {
                continue;
            };
            let held = now.saturating_duration_since(last);
            if held > self.max_hold {
                trace!("Hold time for {}: {} ms", key, held.as_millis());
                release_key(&mut self.sink, key, state);
                released += 1;
            }
        }
        released
    }

    /// Release every key still pressed. Returns the number of keys released.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        for (key, state) in &mut self.states {
            if state.pressed {
                release_key(&mut self.sink, key, state);
                released += 1;
            }
            state.range_entered = None;
        }
        released
    }
}

fn on_digital_event<K: KeySink>(sink: &mut K, key: &str, state: &mut KeyState, now: Instant) {
    if !state.pressed {
        press_key(sink, key, state, now, PressSource::Digital);
    } else {
        state.last_activity = Some(now);
    }
}

/// `dwell` is the hold time of the shortest rule containing the sample, or
/// `None` when no rule for this key matches it.
fn on_analog_sample<K: KeySink>(
    sink: &mut K,
    key: &str,
    dwell: Option<Duration>,
    state: &mut KeyState,
    now: Instant,
) {
    let Some(hold_required) = dwell else {
        if state.pressed {
            release_key(sink, key, state);
        }
        state.range_entered = None;
        return;
    };

    if state.pressed {
        state.last_activity = Some(now);
        return;
    }

    let entered = *state.range_entered.get_or_insert(now);
    if now.saturating_duration_since(entered) >= hold_required {
        press_key(sink, key, state, now, PressSource::Analog);
    }
}

// State follows the input even if the sink fails, so a later release is
// still attempted.
fn press_key<K: KeySink>(
    sink: &mut K,
    key: &str,
    state: &mut KeyState,
    now: Instant,
    source: PressSource,
) {
    if let Err(e) = sink.press(key) {
        warn!("Press of '{}' failed: {}", key, e);
    }
    state.pressed = true;
    state.last_activity = Some(now);
    state.source = Some(source);
    info!("Pressed key: {}", key);
}

fn release_key<K: KeySink>(sink: &mut K, key: &str, state: &mut KeyState) {
    if let Err(e) = sink.release(key) {
        warn!("Release of '{}' failed: {}", key, e);
    }
    state.pressed = false;
    state.source = None;
    info!("Released key: {}", key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::ThresholdRule;
    use crate::sink::recording::{KeyAction, RecordingSink};
    use crate::sink::SinkError;

    fn at(ms: u64) -> Instant {
        Instant::from_millis(ms)
    }

    fn rule(key: &str, low: u16, high: u16, hold_ms: u64) -> ThresholdRule {
        ThresholdRule::new(key, low, high, Duration::from_millis(hold_ms)).unwrap()
    }

    fn digital_engine() -> (MappingEngine<RecordingSink>, RecordingSink) {
        let mut map = KeyMap::new();
        map.insert_digital("2", "a").unwrap();
        let sink = RecordingSink::new();
        (MappingEngine::new(map, sink.clone()), sink)
    }

    fn analog_engine(rules: Vec<ThresholdRule>) -> (MappingEngine<RecordingSink>, RecordingSink) {
        let mut map = KeyMap::new();
        map.insert_analog("A0", rules).unwrap();
        let sink = RecordingSink::new();
        (MappingEngine::new(map, sink.clone()), sink)
    }

    // --- Digital ---

    #[test]
    fn test_digital_press_then_auto_release() {
        let (mut engine, sink) = digital_engine();

        engine.handle_line("2", at(0)).unwrap();
        assert!(engine.is_pressed("a"));
        assert_eq!(sink.actions(), vec![KeyAction::Press("a".into())]);

        for ms in 1..=150 {
            engine.check_timeouts(at(ms));
        }

        assert_eq!(
            sink.actions(),
            vec![KeyAction::Press("a".into()), KeyAction::Release("a".into())]
        );
        assert!(!engine.is_pressed("a"));
    }

    #[test]
    fn test_digital_release_is_strictly_after_max_hold() {
        let (mut engine, sink) = digital_engine();

        engine.handle_line("2", at(0)).unwrap();
        assert_eq!(engine.check_timeouts(at(100)), 0);
        assert!(engine.is_pressed("a"));
        assert_eq!(engine.check_timeouts(at(101)), 1);
        assert_eq!(sink.releases("a"), 1);
    }

    #[test]
    fn test_digital_heartbeat_keeps_key_held() {
        let (mut engine, sink) = digital_engine();

        for ms in (0..500).step_by(50) {
            engine.handle_line("2", at(ms)).unwrap();
            engine.check_timeouts(at(ms));
        }

        assert_eq!(sink.presses("a"), 1);
        assert_eq!(sink.releases("a"), 0);
        assert_eq!(engine.key_state("a").unwrap().last_activity, Some(at(450)));

        engine.check_timeouts(at(551));
        assert_eq!(sink.releases("a"), 1);
    }

    #[test]
    fn test_digital_repress_after_release() {
        let (mut engine, sink) = digital_engine();

        engine.handle_line("2", at(0)).unwrap();
        engine.check_timeouts(at(200));
        engine.handle_line("2", at(300)).unwrap();

        assert_eq!(sink.presses("a"), 2);
        assert_eq!(sink.releases("a"), 1);
    }

    #[test]
    fn test_shared_key_has_one_state() {
        let mut map = KeyMap::new();
        map.insert_digital("2", "space").unwrap();
        map.insert_digital("3", "space").unwrap();
        let sink = RecordingSink::new();
        let mut engine = MappingEngine::new(map, sink.clone());

        engine.handle_line("2", at(0)).unwrap();
        engine.handle_line("3", at(10)).unwrap();

        assert_eq!(sink.presses("space"), 1);
        assert_eq!(engine.key_state("space").unwrap().last_activity, Some(at(10)));
    }

    #[test]
    fn test_custom_max_hold() {
        let (engine, sink) = digital_engine();
        let mut engine = engine.with_max_hold(Duration::from_millis(20));

        engine.handle_line("2", at(0)).unwrap();
        engine.check_timeouts(at(21));

        assert_eq!(sink.releases("a"), 1);
    }

    // --- Analog ---

    #[test]
    fn test_analog_zero_hold_presses_immediately() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 0)]);

        engine.handle_line("A0:500", at(0)).unwrap();

        assert_eq!(sink.actions(), vec![KeyAction::Press("w".into())]);
    }

    #[test]
    fn test_analog_dwell_then_release() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 50)]);

        for ms in 0..=60 {
            engine.handle_line("A0:500", at(ms)).unwrap();
            engine.check_timeouts(at(ms));
            assert_eq!(engine.is_pressed("w"), ms >= 50, "at {} ms", ms);
        }

        engine.handle_line("A0:0", at(61)).unwrap();

        assert_eq!(
            sink.actions(),
            vec![KeyAction::Press("w".into()), KeyAction::Release("w".into())]
        );
    }

    #[test]
    fn test_analog_out_of_range_resets_dwell() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 50)]);

        for ms in 0..40 {
            engine.handle_line("A0:500", at(ms)).unwrap();
        }
        engine.handle_line("A0:900", at(40)).unwrap();
        assert_eq!(engine.key_state("w").unwrap().range_entered, None);

        // Dwell restarts at 41, so nothing happens before 91
        for ms in 41..91 {
            engine.handle_line("A0:500", at(ms)).unwrap();
        }
        assert_eq!(sink.presses("w"), 0);

        engine.handle_line("A0:500", at(91)).unwrap();
        assert_eq!(sink.presses("w"), 1);
        assert_eq!(sink.releases("w"), 0);
    }

    #[test]
    fn test_analog_bounds_are_inclusive() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 0)]);

        engine.handle_line("A0:300", at(0)).unwrap();
        assert!(engine.is_pressed("w"));
        engine.handle_line("A0:700", at(1)).unwrap();
        assert!(engine.is_pressed("w"));
        engine.handle_line("A0:701", at(2)).unwrap();
        assert!(!engine.is_pressed("w"));
        assert_eq!(sink.presses("w"), 1);
    }

    #[test]
    fn test_analog_repeated_samples_press_once() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 0)]);

        for ms in 0..100 {
            engine.handle_line("A0:450", at(ms)).unwrap();
        }

        assert_eq!(sink.presses("w"), 1);
        assert_eq!(engine.key_state("w").unwrap().last_activity, Some(at(99)));
    }

    #[test]
    fn test_analog_keys_skip_timeout_sweep() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 0)]);

        engine.handle_line("A0:500", at(0)).unwrap();
        assert_eq!(engine.check_timeouts(at(10_000)), 0);

        assert!(engine.is_pressed("w"));
        assert_eq!(sink.releases("w"), 0);
    }

    #[test]
    fn test_overlapping_rules_are_independent() {
        let (mut engine, sink) = analog_engine(vec![
            rule("w", 300, 700, 0),
            rule("shift", 600, 1023, 0),
            rule("s", 0, 100, 0),
        ]);

        engine.handle_line("A0:650", at(0)).unwrap();
        assert!(engine.is_pressed("w"));
        assert!(engine.is_pressed("shift"));
        assert!(!engine.is_pressed("s"));

        engine.handle_line("A0:800", at(1)).unwrap();
        assert!(!engine.is_pressed("w"));
        assert!(engine.is_pressed("shift"));

        assert_eq!(sink.presses("w"), 1);
        assert_eq!(sink.releases("w"), 1);
        assert_eq!(sink.presses("shift"), 1);
        assert_eq!(sink.presses("s"), 0);
        assert_eq!(sink.releases("s"), 0);
    }

    #[test]
    fn test_out_of_range_never_releases_unpressed_key() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 300, 700, 0)]);

        engine.handle_line("A0:0", at(0)).unwrap();
        engine.handle_line("A0:1023", at(1)).unwrap();

        assert!(sink.actions().is_empty());
    }

    #[test]
    fn test_split_bands_for_one_key_hold_steady() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 0, 100, 0), rule("w", 900, 1023, 0)]);

        for ms in 0..5 {
            engine.handle_line("A0:950", at(ms)).unwrap();
        }
        assert_eq!(sink.presses("w"), 1);
        assert_eq!(sink.releases("w"), 0);

        // Moving between the two bands keeps the key held
        engine.handle_line("A0:50", at(5)).unwrap();
        assert!(engine.is_pressed("w"));

        engine.handle_line("A0:500", at(6)).unwrap();
        assert_eq!(
            sink.actions(),
            vec![KeyAction::Press("w".into()), KeyAction::Release("w".into())]
        );
    }

    #[test]
    fn test_split_bands_use_shortest_matching_dwell() {
        let (mut engine, sink) =
            analog_engine(vec![rule("w", 0, 600, 80), rule("w", 400, 1023, 20)]);

        for ms in 0..=20 {
            engine.handle_line("A0:500", at(ms)).unwrap();
        }
        assert_eq!(sink.presses("w"), 1);
    }

    // --- Sink failures ---

    /// Sink that rejects every press but accepts releases.
    #[derive(Default)]
    struct FailingSink {
        releases: Vec<String>,
    }

    impl KeySink for FailingSink {
        fn press(&mut self, key: &str) -> Result<(), SinkError> {
            Err(SinkError::Io(format!("cannot press {}", key)))
        }

        fn release(&mut self, key: &str) -> Result<(), SinkError> {
            self.releases.push(key.to_owned());
            Ok(())
        }
    }

    #[test]
    fn test_failed_press_still_tracks_state() {
        let mut map = KeyMap::new();
        map.insert_digital("2", "a").unwrap();
        let mut engine = MappingEngine::new(map, FailingSink::default());

        engine.handle_line("2", at(0)).unwrap();
        assert!(engine.is_pressed("a"));

        assert_eq!(engine.check_timeouts(at(101)), 1);
        assert!(!engine.is_pressed("a"));
        assert_eq!(engine.sink().releases, vec!["a"]);
    }

    // --- Line handling ---

    #[test]
    fn test_unmapped_pins_ignored() {
        let (mut engine, sink) = digital_engine();

        engine.handle_line("9", at(0)).unwrap();
        engine.handle_line("A5:100", at(0)).unwrap();

        assert!(sink.actions().is_empty());
    }

    #[test]
    fn test_mismatched_line_kind_ignored() {
        let mut map = KeyMap::new();
        map.insert_digital("2", "a").unwrap();
        map.insert_analog("A0", vec![rule("w", 0, 1023, 0)]).unwrap();
        let sink = RecordingSink::new();
        let mut engine = MappingEngine::new(map, sink.clone());

        engine.handle_line("2:500", at(0)).unwrap();
        engine.handle_line("A0", at(0)).unwrap();

        assert!(sink.actions().is_empty());
    }

    #[test]
    fn test_malformed_line_is_reported() {
        let (mut engine, sink) = analog_engine(vec![rule("w", 0, 1023, 0)]);

        assert_eq!(
            engine.handle_line("A0:abc", at(0)),
            Err(ParseError::InvalidValue)
        );
        assert_eq!(engine.handle_line("", at(0)), Err(ParseError::Empty));
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn test_replies_ignored() {
        let (mut engine, sink) = digital_engine();

        engine.handle_line("OK", at(0)).unwrap();
        engine.handle_line("ERR", at(0)).unwrap();

        assert!(sink.actions().is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut map = KeyMap::new();
        map.insert_digital("2", "a").unwrap();
        map.insert_analog("A0", vec![rule("w", 0, 1023, 0)]).unwrap();
        let sink = RecordingSink::new();
        let mut engine = MappingEngine::new(map, sink.clone());

        engine.handle_line("2", at(0)).unwrap();
        engine.handle_line("A0:5", at(0)).unwrap();
        let mut pressed: Vec<_> = engine.pressed_keys().collect();
        pressed.sort_unstable();
        assert_eq!(pressed, vec!["a", "w"]);

        assert_eq!(engine.release_all(), 2);
        assert_eq!(engine.pressed_keys().count(), 0);
        assert_eq!(sink.releases("a"), 1);
        assert_eq!(sink.releases("w"), 1);
        assert_eq!(engine.release_all(), 0);
    }
}
