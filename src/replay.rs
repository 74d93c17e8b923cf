//! Frame scripts: recorded or hand-written hand frames that stand in for a
//! live camera.
//!
//! ```toml
//! # Hold two fingers for a quarter second, then pinch high.
//! [[frames]]
//! t = 0
//! until = 250
//! every = 30
//! hands = [{ handedness = "Right", palm = [0.5, 0.5], fingers = 2 }]
//!
//! [[frames]]
//! t = 300
//! hands = [{ handedness = "Right", palm = [0.5, 0.5], pinch = [0.5, 0.2] }]
//! ```
//!
//! A hand is either a `pose` shorthand as above or the full detector output
//! (`handedness` plus 21 `landmarks`).

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::gesture::hand::landmarks;
use crate::gesture::{GestureState, Handedness, Landmark, RawHand};

const DEFAULT_EVERY_MS: u64 = 33;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FrameScript {
    #[serde(default)]
    pub frames: Vec<ScriptFrame>,
}

/// One frame, or a run of identical frames from `t` to `until`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptFrame {
    pub t: u64,
    #[serde(default)]
    pub until: Option<u64>,
    #[serde(default)]
    pub every: Option<u64>,
    #[serde(default)]
    pub hands: Vec<ScriptHand>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScriptHand {
    Raw(RawHand),
    Pose(Pose),
}

/// Compact description of a hand, expanded to plausible landmarks.
#[derive(Debug, Clone, Deserialize)]
pub struct Pose {
    pub handedness: Handedness,
    pub palm: [f32; 2],
    /// Extended fingers, index first.
    #[serde(default)]
    pub fingers: u8,
    /// Thumb and index tips meet here.
    #[serde(default)]
    pub pinch: Option<[f32; 2]>,
}

impl Pose {
    /// Palm joints average to `palm`; extended tips sit 0.2 above it and
    /// curled ones 0.05, so the default thresholds read them unambiguously.
    pub fn to_raw(&self) -> RawHand {
        let [cx, cy] = self.palm;
        let mut lms = vec![Landmark::new(cx, cy); landmarks::COUNT];

        lms[landmarks::WRIST] = Landmark::new(cx, cy + 0.06);
        lms[landmarks::INDEX_MCP] = Landmark::new(cx - 0.03, cy - 0.02);
        lms[landmarks::MIDDLE_MCP] = Landmark::new(cx, cy - 0.02);
        lms[landmarks::PINKY_MCP] = Landmark::new(cx + 0.03, cy - 0.02);

        for (i, &tip) in landmarks::FINGERTIPS.iter().enumerate() {
            let dx = -0.03 + 0.02 * i as f32;
            let reach = if i < usize::from(self.fingers) { 0.2 } else { 0.05 };
            lms[tip] = Landmark::new(cx + dx, cy - reach);
        }
        lms[landmarks::THUMB_TIP] = Landmark::new(cx - 0.07, cy + 0.04);

        if let Some([px, py]) = self.pinch {
            lms[landmarks::THUMB_TIP] = Landmark::new(px, py);
            lms[landmarks::INDEX_TIP] = Landmark::new(px, py);
        }

        RawHand {
            handedness: self.handedness,
            landmarks: lms,
        }
    }
}

impl ScriptHand {
    pub fn to_raw(&self) -> RawHand {
        match self {
            Self::Raw(raw) => raw.clone(),
            Self::Pose(pose) => pose.to_raw(),
        }
    }
}

/// A concrete frame ready for the controller.
#[derive(Debug, Clone)]
pub struct Frame {
    pub t: u64,
    pub hands: Vec<RawHand>,
}

impl FrameScript {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let script: Self = toml::from_str(text).context("invalid frame script")?;
        script.validate()?;
        Ok(script)
    }

    /// Timestamps must never go backwards.
    pub fn validate(&self) -> Result<()> {
        let mut last_end = None;
        for (i, frame) in self.frames.iter().enumerate() {
            if last_end.is_some_and(|end| frame.t < end) {
                bail!("frame {} at t={} goes back in time", i, frame.t);
            }
            if frame.until.is_some_and(|until| until < frame.t) {
                bail!("frame {} ends before it starts", i);
            }
            if frame.every == Some(0) {
                bail!("frame {} has every = 0", i);
            }
            last_end = Some(frame.until.unwrap_or(frame.t));
        }
        Ok(())
    }

    /// Expand repeats into individual frames.
    pub fn frames(&self) -> Vec<Frame> {
        let mut out = Vec::new();
        for frame in &self.frames {
            let hands: Vec<RawHand> = frame.hands.iter().map(ScriptHand::to_raw).collect();
            let end = frame.until.unwrap_or(frame.t);
            let step = frame.every.unwrap_or(DEFAULT_EVERY_MS).max(1);

            let mut t = frame.t;
            while t <= end {
                out.push(Frame {
                    t,
                    hands: hands.clone(),
                });
                t += step;
            }
        }
        out
    }

    /// Timestamp of the last frame.
    pub fn duration_ms(&self) -> u64 {
        self.frames().last().map_or(0, |f| f.t)
    }
}

/// Discrete things that happened on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// 0-based stem index.
    StemSelected(usize),
    PlayPause,
    TrackSwitch,
    /// 1-based effect number.
    Effect(usize),
}

impl ControlEvent {
    pub fn from_state(state: &GestureState) -> Vec<Self> {
        let mut events = Vec::new();
        if let Some(stem) = state.stem_select {
            events.push(Self::StemSelected(stem));
        }
        if state.play_pause {
            events.push(Self::PlayPause);
        }
        if state.track_switch {
            events.push(Self::TrackSwitch);
        }
        if let Some(effect) = state.effect_trigger {
            events.push(Self::Effect(effect));
        }
        events
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StemSelected(stem) => write!(f, "select stem {}", stem + 1),
            Self::PlayPause => write!(f, "play/pause"),
            Self::TrackSwitch => write!(f, "next track"),
            Self::Effect(effect) => write!(f, "effect {effect}"),
        }
    }
}
