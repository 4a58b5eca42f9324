use serde::{Deserialize, Serialize};

/// Replacement text for one counted string and the capacity of its buffer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPatch {
    pub text: String,
    /// Buffer capacity in UTF-16 code units
    pub max_units: usize,
}

impl TextPatch {
    pub fn new(text: impl Into<String>, max_units: usize) -> Self {
        Self {
            text: text.into(),
            max_units,
        }
    }
}

/// What a session writes once every location is resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchPlan {
    /// Sized to the `:(` buffer: two characters and a terminator
    pub face: TextPatch,
    pub message_one: TextPatch,
    /// Longer than this spills into the progress counter that follows it
    pub message_two: TextPatch,
    /// ARGB, stored little-endian
    pub colour: u32,
    /// The colour lives in runtime data that an image on disk may not have
    pub patch_colour: bool,
}

impl Default for PatchPlan {
    fn default() -> Self {
        Self {
            face: TextPatch::new(":8[", 3),
            message_one: TextPatch::new("Have you seen your skills? I ain't worried one bit.", 96),
            message_two: TextPatch::new(
                "We're just collecting some error info, and then think of how pathetic you are. Ha, wow.",
                96,
            ),
            colour: 0xFF8B_0000,
            patch_colour: true,
        }
    }
}

impl PatchPlan {
    /// Create a new plan builder
    pub fn builder() -> PatchPlanBuilder {
        PatchPlanBuilder::default()
    }
}

/// Builder for PatchPlan
#[derive(Debug, Clone, Default)]
pub struct PatchPlanBuilder {
    face: Option<String>,
    message_one: Option<String>,
    message_two: Option<String>,
    colour: Option<u32>,
    patch_colour: Option<bool>,
}

impl PatchPlanBuilder {
    pub fn face(mut self, text: impl Into<String>) -> Self {
        self.face = Some(text.into());
        self
    }

    pub fn message_one(mut self, text: impl Into<String>) -> Self {
        self.message_one = Some(text.into());
        self
    }

    pub fn message_two(mut self, text: impl Into<String>) -> Self {
        self.message_two = Some(text.into());
        self
    }

    pub fn colour(mut self, argb: u32) -> Self {
        self.colour = Some(argb);
        self
    }

    /// Skip the colour write
    pub fn without_colour(mut self) -> Self {
        self.patch_colour = Some(false);
        self
    }

    /// Build the plan, keeping default capacities
    pub fn build(self) -> PatchPlan {
        let default = PatchPlan::default();
        let text = |value: Option<String>, fallback: TextPatch| TextPatch {
            text: value.unwrap_or(fallback.text),
            max_units: fallback.max_units,
        };
        PatchPlan {
            face: text(self.face, default.face),
            message_one: text(self.message_one, default.message_one),
            message_two: text(self.message_two, default.message_two),
            colour: self.colour.unwrap_or(default.colour),
            patch_colour: self.patch_colour.unwrap_or(default.patch_colour),
        }
    }
}
