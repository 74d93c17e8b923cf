//! Per-frame hand observations derived from raw detector landmarks,
//! and the control/effect role assignment across frames.

use serde::Deserialize;
use tracing::debug;

use super::{HandConfig, Handedness};

/// Landmark indices (MediaPipe hand landmark convention).
pub mod landmarks {
    pub const WRIST: usize = 0;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_MCP: usize = 5;
    pub const INDEX_TIP: usize = 8;
    pub const MIDDLE_MCP: usize = 9;
    pub const MIDDLE_TIP: usize = 12;
    pub const RING_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_TIP: usize = 20;

    /// Landmarks per hand.
    pub const COUNT: usize = 21;

    pub const FINGERTIPS: [usize; 4] = [INDEX_TIP, MIDDLE_TIP, RING_TIP, PINKY_TIP];
}

/// A single landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    /// 0.0 (left edge) to 1.0 (right edge)
    pub x: f32,
    /// 0.0 (top edge) to 1.0 (bottom edge)
    pub y: f32,
    /// Depth relative to the wrist; unused by the gesture pipeline.
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn distance(&self, other: &Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl From<Landmark> for Point {
    fn from(lm: Landmark) -> Self {
        Self { x: lm.x, y: lm.y }
    }
}

/// One hand exactly as the external detector reported it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawHand {
    /// Detector label, before mirroring correction.
    pub handedness: Handedness,
    pub landmarks: Vec<Landmark>,
}

/// A hand with its derived control features, rebuilt every frame.
#[derive(Debug, Clone)]
pub struct HandObservation {
    pub landmarks: Vec<Landmark>,
    /// Performer's hand, already corrected for mirroring.
    pub handedness: Handedness,
    /// Mean of wrist and index/middle/pinky MCP joints.
    pub palm_center: Point,
    pub is_pinching: bool,
    /// Midpoint between thumb and index tips.
    pub pinch_position: Point,
    pub extended_finger_count: u8,
    /// `extended_finger_count == 0`
    pub is_fist: bool,
    /// `extended_finger_count >= open_finger_count`
    pub is_open: bool,
    /// Every fingertip within `fist_threshold` of the palm.
    pub tips_curled: bool,
}

impl HandObservation {
    /// Derive an observation, or `None` if the landmark set is unusable.
    pub fn from_raw(raw: &RawHand, config: &HandConfig) -> Option<Self> {
        if raw.landmarks.len() < landmarks::COUNT || !raw.landmarks.iter().all(Landmark::is_finite)
        {
            return None;
        }

        let at = |idx: usize| Point::from(raw.landmarks[idx]);

        let wrist = at(landmarks::WRIST);
        let index_mcp = at(landmarks::INDEX_MCP);
        let middle_mcp = at(landmarks::MIDDLE_MCP);
        let pinky_mcp = at(landmarks::PINKY_MCP);
        let thumb_tip = at(landmarks::THUMB_TIP);
        let index_tip = at(landmarks::INDEX_TIP);

        let palm_center = Point {
            x: (wrist.x + index_mcp.x + middle_mcp.x + pinky_mcp.x) / 4.0,
            y: (wrist.y + index_mcp.y + middle_mcp.y + pinky_mcp.y) / 4.0,
        };

        let is_pinching = thumb_tip.distance(&index_tip) < config.pinch_threshold;
        let pinch_position = Point {
            x: (thumb_tip.x + index_tip.x) / 2.0,
            y: (thumb_tip.y + index_tip.y) / 2.0,
        };

        let mut extended = 0u8;
        let mut tips_curled = true;
        for tip in landmarks::FINGERTIPS {
            let dist = at(tip).distance(&palm_center);
            if dist > config.palm_open_threshold {
                extended += 1;
            }
            if dist >= config.fist_threshold {
                tips_curled = false;
            }
        }
        if config.count_thumb {
            let dist = thumb_tip.distance(&palm_center);
            if dist > config.palm_open_threshold * config.thumb_threshold_scale {
                extended += 1;
            }
        }

        let handedness = if config.mirrored {
            raw.handedness.mirrored()
        } else {
            raw.handedness
        };

        Some(Self {
            landmarks: raw.landmarks.clone(),
            handedness,
            palm_center,
            is_pinching,
            pinch_position,
            extended_finger_count: extended,
            is_fist: extended == 0,
            is_open: extended >= config.open_finger_count,
            tips_curled,
        })
    }
}

/// The hands driving each role this frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandRoles<'a> {
    pub control: Option<&'a HandObservation>,
    pub effect: Option<&'a HandObservation>,
}

/// Turns raw detector output into observations and keeps the control-hand
/// choice stable across frames.
#[derive(Debug, Clone)]
pub struct HandAdapter {
    config: HandConfig,
    control_label: Option<Handedness>,
}

impl HandAdapter {
    pub fn new(config: HandConfig) -> Self {
        Self {
            config,
            control_label: None,
        }
    }

    pub fn config(&self) -> &HandConfig {
        &self.config
    }

    /// Label currently locked as the control hand.
    pub fn control_label(&self) -> Option<Handedness> {
        self.control_label
    }

    /// Convert one frame. A single malformed hand drops the whole frame.
    pub fn observe(&self, raw: &[RawHand]) -> Vec<HandObservation> {
        let mut hands = Vec::with_capacity(raw.len());
        for hand in raw {
            match HandObservation::from_raw(hand, &self.config) {
                Some(obs) => hands.push(obs),
                None => {
                    debug!(
                        landmarks = hand.landmarks.len(),
                        "malformed hand detection, treating frame as empty"
                    );
                    return Vec::new();
                }
            }
        }
        hands
    }

    /// Pick the control hand and, if present, a differently-handed effect hand.
    ///
    /// The first chosen control label sticks. When that label disappears the
    /// first visible hand stands in, since detectors briefly mislabel hands.
    pub fn assign_roles<'a>(&mut self, hands: &'a [HandObservation]) -> HandRoles<'a> {
        if hands.is_empty() {
            return HandRoles::default();
        }

        let label = *self.control_label.get_or_insert_with(|| {
            hands
                .iter()
                .find(|h| h.handedness == self.config.control_hand)
                .unwrap_or(&hands[0])
                .handedness
        });

        let control_idx = hands
            .iter()
            .position(|h| h.handedness == label)
            .unwrap_or(0);
        let control = &hands[control_idx];

        let effect = hands.iter().enumerate().find_map(|(i, h)| {
            (i != control_idx
                && h.handedness == self.config.effect_hand
                && h.handedness != control.handedness)
                .then_some(h)
        });

        HandRoles {
            control: Some(control),
            effect,
        }
    }

    pub fn reset(&mut self) {
        self.control_label = None;
    }
}
