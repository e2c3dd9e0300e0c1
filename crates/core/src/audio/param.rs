/// A single automation instruction, timestamped in render frames.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Automation {
    SetValue { frame: u64, value: f32 },
    LinearRamp { frame: u64, value: f32 },
}

impl Automation {
    fn frame(&self) -> u64 {
        match *self {
            Self::SetValue { frame, .. } | Self::LinearRamp { frame, .. } => frame,
        }
    }

    fn value(&self) -> f32 {
        match *self {
            Self::SetValue { value, .. } | Self::LinearRamp { value, .. } => value,
        }
    }
}

/// Sample-accurate parameter timeline.
///
/// Values are scheduled against the render clock of the owning
/// [`AudioGraph`](super::AudioGraph): a ramp runs from the value and frame of
/// the preceding event to its own target. Scheduled instructions cannot be
/// revoked individually; [`cancel_scheduled_values`](Self::cancel_scheduled_values)
/// drops everything at or after a frame so a new curve can take over.
#[derive(Debug, Clone)]
pub struct AudioParam {
    anchor_frame: u64,
    anchor_value: f32,
    events: Vec<Automation>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self {
            anchor_frame: 0,
            anchor_value: value,
            events: Vec::new(),
        }
    }

    pub fn set_value_at_time(&mut self, value: f32, frame: u64) {
        self.insert(Automation::SetValue { frame, value });
    }

    pub fn linear_ramp_to_value_at_time(&mut self, value: f32, frame: u64) {
        self.insert(Automation::LinearRamp { frame, value });
    }

    /// Removes every event scheduled at or after `frame`.
    pub fn cancel_scheduled_values(&mut self, frame: u64) {
        self.events.retain(|event| event.frame() < frame);
    }

    /// Number of automation events that have not completed yet.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Evaluates the timeline at `frame`.
    pub fn value_at(&self, frame: u64) -> f32 {
        let mut from_frame = self.anchor_frame;
        let mut from_value = self.anchor_value;

        for event in &self.events {
            match *event {
                Automation::SetValue { frame: at, value } => {
                    if at > frame {
                        break;
                    }
                    from_frame = at;
                    from_value = value;
                }
                Automation::LinearRamp { frame: at, value } => {
                    if at <= frame {
                        from_frame = at;
                        from_value = value;
                        continue;
                    }
                    let span = (at - from_frame) as f64;
                    let progress = frame.saturating_sub(from_frame) as f64 / span;
                    return from_value + (value - from_value) * progress as f32;
                }
            }
        }

        from_value
    }

    /// Folds every event that completed at or before `frame` into the anchor.
    pub(crate) fn advance_to(&mut self, frame: u64) {
        let completed = self
            .events
            .iter()
            .take_while(|event| event.frame() <= frame)
            .count();
        if let Some(last) = completed.checked_sub(1).map(|index| self.events[index]) {
            self.anchor_frame = last.frame();
            self.anchor_value = last.value();
            self.events.drain(..completed);
        }
    }

    fn insert(&mut self, event: Automation) {
        let index = self
            .events
            .partition_point(|existing| existing.frame() <= event.frame());
        self.events.insert(index, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramps_linearly_between_events() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 100);
        param.linear_ramp_to_value_at_time(1.0, 200);

        assert_eq!(param.value_at(50), 0.0);
        assert_eq!(param.value_at(100), 0.0);
        assert!((param.value_at(150) - 0.5).abs() < 1e-6);
        assert_eq!(param.value_at(200), 1.0);
        assert_eq!(param.value_at(10_000), 1.0);
    }

    #[test]
    fn set_value_waits_for_its_frame() {
        let mut param = AudioParam::new(0.25);
        param.set_value_at_time(0.75, 10);

        assert_eq!(param.value_at(9), 0.25);
        assert_eq!(param.value_at(10), 0.75);
    }

    #[test]
    fn cancel_then_hold_continues_from_current_value() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 0);
        param.linear_ramp_to_value_at_time(0.8, 100);

        let current = param.value_at(50);
        param.cancel_scheduled_values(50);
        param.set_value_at_time(current, 50);
        param.linear_ramp_to_value_at_time(0.0, 150);

        assert!((param.value_at(50) - 0.4).abs() < 1e-6);
        assert!((param.value_at(100) - 0.2).abs() < 1e-6);
        assert_eq!(param.value_at(150), 0.0);
    }

    #[test]
    fn advancing_preserves_in_flight_ramps() {
        let mut param = AudioParam::new(0.0);
        param.set_value_at_time(0.0, 0);
        param.linear_ramp_to_value_at_time(1.0, 100);

        param.advance_to(40);
        assert_eq!(param.pending_events(), 1);
        assert!((param.value_at(60) - 0.6).abs() < 1e-6);

        param.advance_to(100);
        assert_eq!(param.pending_events(), 0);
        assert_eq!(param.value_at(500), 1.0);
    }
}
