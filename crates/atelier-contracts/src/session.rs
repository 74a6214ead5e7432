use anyhow::bail;
use uuid::Uuid;

use crate::catalog::Pose;
use crate::image::EncodedImage;
use crate::settings::ShootSettings;

pub const MAX_CLOTHING_IMAGES: usize = 8;

/// Wizard steps in their fixed forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowStep {
    PoseSelection,
    ClothingEdit,
    FinalGeneration,
    Result,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 4] = [
        WorkflowStep::PoseSelection,
        WorkflowStep::ClothingEdit,
        WorkflowStep::FinalGeneration,
        WorkflowStep::Result,
    ];

    /// Position in the forward order, 0-based. Drives the progress
    /// indicator; transitions themselves never do index arithmetic.
    pub fn sequence_index(self) -> usize {
        match self {
            WorkflowStep::PoseSelection => 0,
            WorkflowStep::ClothingEdit => 1,
            WorkflowStep::FinalGeneration => 2,
            WorkflowStep::Result => 3,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            WorkflowStep::PoseSelection => "Pose",
            WorkflowStep::ClothingEdit => "Clothing",
            WorkflowStep::FinalGeneration => "Studio",
            WorkflowStep::Result => "Result",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::PoseSelection => "pose_selection",
            WorkflowStep::ClothingEdit => "clothing_edit",
            WorkflowStep::FinalGeneration => "final_generation",
            WorkflowStep::Result => "result",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Pose,
    Look,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationKind::Pose => "pose",
            GenerationKind::Look => "look",
        }
    }
}

/// The single mutable aggregate for one wizard run.
///
/// All step transitions and data edits go through methods that enforce the
/// wizard's guards; callers never touch fields directly. Backward moves
/// keep collected data, only a reset clears it.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    step: WorkflowStep,
    selected_pose: Option<Pose>,
    model_photo: Option<EncodedImage>,
    pose_image: Option<EncodedImage>,
    clothing: Vec<EncodedImage>,
    settings: ShootSettings,
    final_look: Option<EncodedImage>,
    last_error: Option<String>,
    in_flight: Option<GenerationKind>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            step: WorkflowStep::PoseSelection,
            selected_pose: None,
            model_photo: None,
            pose_image: None,
            clothing: Vec::new(),
            settings: ShootSettings::default(),
            final_look: None,
            last_error: None,
            in_flight: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn step(&self) -> WorkflowStep {
        self.step
    }

    pub fn selected_pose(&self) -> Option<&Pose> {
        self.selected_pose.as_ref()
    }

    pub fn model_photo(&self) -> Option<&EncodedImage> {
        self.model_photo.as_ref()
    }

    pub fn pose_image(&self) -> Option<&EncodedImage> {
        self.pose_image.as_ref()
    }

    pub fn clothing(&self) -> &[EncodedImage] {
        &self.clothing
    }

    pub fn settings(&self) -> &ShootSettings {
        &self.settings
    }

    pub fn final_look(&self) -> Option<&EncodedImage> {
        self.final_look.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn generation_in_flight(&self) -> Option<GenerationKind> {
        self.in_flight
    }

    pub fn select_pose(&mut self, pose: Pose) -> anyhow::Result<()> {
        if self.step != WorkflowStep::PoseSelection {
            bail!("poses can only be chosen on the {} step", WorkflowStep::PoseSelection.title());
        }
        self.selected_pose = Some(pose);
        Ok(())
    }

    pub fn attach_model_photo(&mut self, photo: EncodedImage) -> anyhow::Result<()> {
        if self.step != WorkflowStep::PoseSelection {
            bail!(
                "the model photo can only be attached on the {} step",
                WorkflowStep::PoseSelection.title()
            );
        }
        self.model_photo = Some(photo);
        Ok(())
    }

    /// Appends a decoded batch, keeping at most [`MAX_CLOTHING_IMAGES`]
    /// entries. Existing entries always win over new ones; the overflow is
    /// dropped without error. Returns how many entries were kept.
    pub fn append_clothing(&mut self, batch: Vec<EncodedImage>) -> anyhow::Result<usize> {
        if self.step != WorkflowStep::ClothingEdit {
            bail!(
                "clothing can only be edited on the {} step",
                WorkflowStep::ClothingEdit.title()
            );
        }
        let before = self.clothing.len();
        self.clothing.extend(batch);
        self.clothing.truncate(MAX_CLOTHING_IMAGES);
        Ok(self.clothing.len() - before)
    }

    /// Removes one clothing photo by 0-based position.
    pub fn remove_clothing(&mut self, index: usize) -> anyhow::Result<EncodedImage> {
        if self.step != WorkflowStep::ClothingEdit {
            bail!(
                "clothing can only be edited on the {} step",
                WorkflowStep::ClothingEdit.title()
            );
        }
        if index >= self.clothing.len() {
            bail!("no clothing photo at position {}", index + 1);
        }
        Ok(self.clothing.remove(index))
    }

    /// Settings are only open for edits while the studio step is active.
    pub fn settings_mut(&mut self) -> anyhow::Result<&mut ShootSettings> {
        if self.step != WorkflowStep::FinalGeneration {
            bail!(
                "settings can only be changed on the {} step",
                WorkflowStep::FinalGeneration.title()
            );
        }
        Ok(&mut self.settings)
    }

    /// Marks a generation as running. Clears `last_error`, checks the
    /// step's input guards, and rejects a second concurrent generation.
    pub fn begin_generation(&mut self, kind: GenerationKind) -> anyhow::Result<()> {
        if let Some(running) = self.in_flight {
            bail!("a {} generation is already running", running.as_str());
        }
        match kind {
            GenerationKind::Pose => {
                if self.step != WorkflowStep::PoseSelection {
                    bail!("pose generation only runs on the {} step", WorkflowStep::PoseSelection.title());
                }
                if self.selected_pose.is_none() {
                    bail!("choose a pose first");
                }
                if self.model_photo.is_none() {
                    bail!("attach a model photo first");
                }
            }
            GenerationKind::Look => {
                if self.step != WorkflowStep::FinalGeneration {
                    bail!("look generation only runs on the {} step", WorkflowStep::FinalGeneration.title());
                }
                if self.pose_image.is_none() {
                    bail!("generate a pose image first");
                }
                if self.clothing.is_empty() {
                    bail!("add at least one clothing photo first");
                }
            }
        }
        self.last_error = None;
        self.in_flight = Some(kind);
        Ok(())
    }

    /// Records a successful generation and advances the step.
    pub fn complete_generation(
        &mut self,
        kind: GenerationKind,
        image: EncodedImage,
    ) -> anyhow::Result<()> {
        if self.in_flight != Some(kind) {
            bail!("no {} generation in flight", kind.as_str());
        }
        self.in_flight = None;
        match kind {
            GenerationKind::Pose => {
                self.pose_image = Some(image);
                self.step = WorkflowStep::ClothingEdit;
            }
            GenerationKind::Look => {
                self.final_look = Some(image);
                self.step = WorkflowStep::Result;
            }
        }
        Ok(())
    }

    /// Records a failed generation: the step stays put, the message lands
    /// in `last_error`.
    pub fn fail_generation(
        &mut self,
        kind: GenerationKind,
        message: impl Into<String>,
    ) -> anyhow::Result<()> {
        if self.in_flight != Some(kind) {
            bail!("no {} generation in flight", kind.as_str());
        }
        self.in_flight = None;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Forward move that needs no generation: clothing -> studio.
    pub fn advance_to_styling(&mut self) -> anyhow::Result<()> {
        if self.step != WorkflowStep::ClothingEdit {
            bail!(
                "can only continue to the {} step from the {} step",
                WorkflowStep::FinalGeneration.title(),
                WorkflowStep::ClothingEdit.title()
            );
        }
        if self.clothing.is_empty() {
            bail!("add at least one clothing photo first");
        }
        self.step = WorkflowStep::FinalGeneration;
        Ok(())
    }

    /// Steps backward, keeping all collected data.
    pub fn step_back(&mut self) -> anyhow::Result<WorkflowStep> {
        let previous = match self.step {
            WorkflowStep::ClothingEdit => WorkflowStep::PoseSelection,
            WorkflowStep::FinalGeneration => WorkflowStep::ClothingEdit,
            WorkflowStep::PoseSelection => bail!("already on the first step"),
            WorkflowStep::Result => bail!("a finished session starts over with a reset"),
        };
        self.step = previous;
        Ok(previous)
    }

    /// Clears everything and starts a fresh session under a new id.
    pub fn reset(&mut self) {
        *self = Session::new();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
