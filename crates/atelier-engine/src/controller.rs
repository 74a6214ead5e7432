use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use atelier_contracts::catalog::PoseCatalog;
use atelier_contracts::events::{map_object, EventWriter};
use atelier_contracts::image::EncodedImage;
use atelier_contracts::session::{GenerationKind, Session, WorkflowStep};
use atelier_contracts::settings::ShootSettings;
use atelier_contracts::transcript::Transcript;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::conversation::ConversationClient;
use crate::gemini::{self, is_missing_payload_error, is_transport_error};
use crate::generation::GenerationClient;

pub const POSE_FAILURE_MESSAGE: &str =
    "Could not generate the pose. Check the photo and try again.";
pub const LOOK_FAILURE_MESSAGE: &str = "Could not create the look. Try different settings.";
pub const CHAT_APOLOGY: &str = "Sorry, something went wrong. Please try again.";
pub const ASSISTANT_GREETING: &str = "Hi! I am your photo shoot assistant. How can I help?";

/// Drives one wizard session end to end: step transitions, the two
/// generations, the stylist chat and the event log.
///
/// Generation errors are split into two channels. `Err` means the wizard
/// was not ready for the operation at all (wrong step, missing inputs);
/// `Ok(Some(text))` is a recorded failure whose text is safe to show the
/// user, with the full cause captured in `events.jsonl`.
pub struct SessionController {
    session: Session,
    catalog: PoseCatalog,
    generation: Box<dyn GenerationClient>,
    conversation: Box<dyn ConversationClient>,
    events: EventWriter,
    out_dir: PathBuf,
}

impl SessionController {
    pub fn new(
        out_dir: impl Into<PathBuf>,
        events_path: impl Into<PathBuf>,
        generation: Box<dyn GenerationClient>,
        conversation: Box<dyn ConversationClient>,
    ) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        let session = Session::new();
        let events = EventWriter::new(events_path.into(), session.id());

        events.emit(
            "session_started",
            map_object(json!({
                "step": session.step().as_str(),
                "generation_client": generation.name(),
                "conversation_client": conversation.name(),
                "out_dir": out_dir.to_string_lossy().to_string(),
            })),
        )?;

        Ok(Self {
            session,
            catalog: PoseCatalog::default(),
            generation,
            conversation,
            events,
            out_dir,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn catalog(&self) -> &PoseCatalog {
        &self.catalog
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn select_pose(&mut self, pose_id: &str) -> Result<()> {
        let Some(pose) = self.catalog.get(pose_id).cloned() else {
            bail!("unknown pose '{pose_id}'");
        };
        self.session.select_pose(pose.clone())?;
        self.events.emit(
            "pose_selected",
            map_object(json!({ "pose_id": pose.id, "pose_name": pose.name })),
        )?;
        Ok(())
    }

    pub fn attach_model_photo(&mut self, photo: EncodedImage) -> Result<()> {
        let mime_type = photo.mime_type.clone();
        let byte_len = photo.byte_len();
        self.session.attach_model_photo(photo)?;
        self.events.emit(
            "model_photo_attached",
            map_object(json!({ "mime_type": mime_type, "bytes": byte_len })),
        )?;
        Ok(())
    }

    /// Appends a decoded clothing batch and reports how many entries the
    /// cap let through.
    pub fn add_clothing(&mut self, batch: Vec<EncodedImage>) -> Result<usize> {
        let offered = batch.len();
        let kept = self.session.append_clothing(batch)?;
        self.events.emit(
            "clothing_added",
            map_object(json!({
                "offered": offered,
                "kept": kept,
                "total": self.session.clothing().len(),
            })),
        )?;
        Ok(kept)
    }

    pub fn remove_clothing(&mut self, index: usize) -> Result<()> {
        self.session.remove_clothing(index)?;
        self.events.emit(
            "clothing_removed",
            map_object(json!({
                "index": index,
                "total": self.session.clothing().len(),
            })),
        )?;
        Ok(())
    }

    pub fn update_settings(&mut self, apply: impl FnOnce(&mut ShootSettings)) -> Result<()> {
        apply(self.session.settings_mut()?);
        self.events.emit(
            "settings_updated",
            map_object(json!({ "settings": self.session.settings() })),
        )?;
        Ok(())
    }

    pub fn advance_to_styling(&mut self) -> Result<()> {
        self.session.advance_to_styling()?;
        self.emit_step_changed("forward")
    }

    pub fn step_back(&mut self) -> Result<WorkflowStep> {
        let step = self.session.step_back()?;
        self.emit_step_changed("back")?;
        Ok(step)
    }

    pub fn generate_pose(&mut self) -> Result<Option<String>> {
        self.session.begin_generation(GenerationKind::Pose)?;
        let (Some(pose), Some(photo)) = (
            self.session.selected_pose().cloned(),
            self.session.model_photo().cloned(),
        ) else {
            self.session
                .fail_generation(GenerationKind::Pose, POSE_FAILURE_MESSAGE)?;
            bail!("pose generation started without its inputs");
        };

        self.events.emit(
            "pose_generation_started",
            map_object(json!({
                "pose_id": pose.id,
                "client": self.generation.name(),
            })),
        )?;

        let started = Instant::now();
        let outcome = self.generation.generate_pose(&photo, &pose.description);
        self.settle_generation(GenerationKind::Pose, outcome, started, POSE_FAILURE_MESSAGE)
    }

    pub fn generate_look(&mut self) -> Result<Option<String>> {
        self.session.begin_generation(GenerationKind::Look)?;
        let Some(pose_image) = self.session.pose_image().cloned() else {
            self.session
                .fail_generation(GenerationKind::Look, LOOK_FAILURE_MESSAGE)?;
            bail!("look generation started without a pose image");
        };
        let clothing = self.session.clothing().to_vec();
        let settings = self.session.settings().clone();

        self.events.emit(
            "look_generation_started",
            map_object(json!({
                "clothing_count": clothing.len(),
                "settings": settings,
                "client": self.generation.name(),
            })),
        )?;

        let started = Instant::now();
        let outcome = self
            .generation
            .generate_look(&pose_image, &clothing, &settings);
        self.settle_generation(GenerationKind::Look, outcome, started, LOOK_FAILURE_MESSAGE)
    }

    /// One stylist exchange. The client sees the transcript as it stood
    /// before this message; the message and the reply (or the apology,
    /// when the call fails) are appended afterwards.
    pub fn chat(&mut self, transcript: &mut Transcript, message: &str) -> Result<String> {
        let outcome = self.conversation.continue_chat(transcript.turns(), message);
        transcript.push_user(message);
        let reply = match outcome {
            Ok(reply) => {
                self.events.emit(
                    "chat_exchange",
                    map_object(json!({
                        "turns": transcript.len() + 1,
                        "client": self.conversation.name(),
                    })),
                )?;
                reply
            }
            Err(err) => {
                self.events.emit(
                    "chat_failed",
                    map_object(json!({
                        "error": gemini::error_chain_text(&err, 2048),
                        "transport": is_transport_error(&err),
                    })),
                )?;
                CHAT_APOLOGY.to_string()
            }
        };
        transcript.push_assistant(reply.clone());
        Ok(reply)
    }

    /// Writes the final look to disk. Without an explicit path the file
    /// lands in the out dir under a timestamped name.
    pub fn save_look(&self, path: Option<&Path>) -> Result<PathBuf> {
        let Some(look) = self.session.final_look() else {
            bail!("no final look to save yet");
        };
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.out_dir.join(format!(
                "look-{}.{}",
                chrono::Utc::now().timestamp_millis(),
                look.extension()
            )),
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&target, &look.bytes)
            .with_context(|| format!("failed to write {}", target.display()))?;
        self.events.emit(
            "look_saved",
            map_object(json!({
                "path": target.to_string_lossy().to_string(),
                "bytes": look.byte_len(),
            })),
        )?;
        Ok(target)
    }

    /// Starts over under a fresh session id. The event log keeps running
    /// and tags subsequent lines with the new id.
    pub fn reset_session(&mut self) -> Result<()> {
        let previous = self.session.id().to_string();
        self.session.reset();
        self.events.set_session_id(self.session.id());
        self.events.emit(
            "session_reset",
            map_object(json!({ "previous_session_id": previous })),
        )?;
        Ok(())
    }

    pub fn finish(&self) -> Result<()> {
        self.events.emit(
            "session_finished",
            map_object(json!({
                "step": self.session.step().as_str(),
                "final_look": self.session.final_look().is_some(),
            })),
        )?;
        Ok(())
    }

    fn emit_step_changed(&self, direction: &str) -> Result<()> {
        self.events.emit(
            "step_changed",
            map_object(json!({
                "step": self.session.step().as_str(),
                "direction": direction,
            })),
        )?;
        Ok(())
    }

    fn settle_generation(
        &mut self,
        kind: GenerationKind,
        outcome: Result<EncodedImage>,
        started: Instant,
        failure_message: &str,
    ) -> Result<Option<String>> {
        let latency_s = started.elapsed().as_secs_f64();
        match outcome {
            Ok(image) => {
                let mime_type = image.mime_type.clone();
                let byte_len = image.byte_len();
                let digest = image_digest(&image);
                self.session.complete_generation(kind, image)?;
                self.events.emit(
                    &format!("{}_generation_completed", kind.as_str()),
                    map_object(json!({
                        "mime_type": mime_type,
                        "bytes": byte_len,
                        "digest": digest,
                        "latency_s": latency_s,
                    })),
                )?;
                self.emit_step_changed("forward")?;
                Ok(None)
            }
            Err(err) => {
                self.session.fail_generation(kind, failure_message)?;
                self.events.emit(
                    &format!("{}_generation_failed", kind.as_str()),
                    map_object(json!({
                        "error": gemini::error_chain_text(&err, 2048),
                        "missing_payload": is_missing_payload_error(&err),
                        "transport": is_transport_error(&err),
                        "latency_s": latency_s,
                    })),
                )?;
                Ok(Some(failure_message.to_string()))
            }
        }
    }
}

fn image_digest(image: &EncodedImage) -> String {
    let digest = Sha256::digest(&image.bytes);
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::anyhow;
    use atelier_contracts::session::WorkflowStep;
    use atelier_contracts::settings::Resolution;
    use atelier_contracts::transcript::ChatTurn;
    use serde_json::Value;
    use tempfile::TempDir;

    use crate::gemini::NoImagePayload;

    use super::*;

    struct FixedGeneration;

    impl GenerationClient for FixedGeneration {
        fn name(&self) -> &str {
            "fixed"
        }

        fn generate_pose(&self, _photo: &EncodedImage, _pose: &str) -> Result<EncodedImage> {
            Ok(EncodedImage::new("image/png", vec![7; 16]))
        }

        fn generate_look(
            &self,
            _pose_image: &EncodedImage,
            clothing: &[EncodedImage],
            _settings: &ShootSettings,
        ) -> Result<EncodedImage> {
            Ok(EncodedImage::new("image/png", vec![clothing.len() as u8; 16]))
        }
    }

    struct FailingGeneration;

    impl GenerationClient for FailingGeneration {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate_pose(&self, _photo: &EncodedImage, _pose: &str) -> Result<EncodedImage> {
            Err(anyhow!("backend unavailable"))
        }

        fn generate_look(
            &self,
            _pose_image: &EncodedImage,
            _clothing: &[EncodedImage],
            _settings: &ShootSettings,
        ) -> Result<EncodedImage> {
            Err(anyhow!("backend unavailable"))
        }
    }

    struct EmptyPayloadGeneration;

    impl GenerationClient for EmptyPayloadGeneration {
        fn name(&self) -> &str {
            "empty"
        }

        fn generate_pose(&self, _photo: &EncodedImage, _pose: &str) -> Result<EncodedImage> {
            Err(anyhow::Error::new(NoImagePayload))
        }

        fn generate_look(
            &self,
            _pose_image: &EncodedImage,
            _clothing: &[EncodedImage],
            _settings: &ShootSettings,
        ) -> Result<EncodedImage> {
            Err(anyhow::Error::new(NoImagePayload))
        }
    }

    struct CannedConversation;

    impl ConversationClient for CannedConversation {
        fn name(&self) -> &str {
            "canned"
        }

        fn continue_chat(&self, _prior: &[ChatTurn], _message: &str) -> Result<String> {
            Ok("Try a tighter crop.".to_string())
        }
    }

    struct FailingConversation;

    impl ConversationClient for FailingConversation {
        fn name(&self) -> &str {
            "failing"
        }

        fn continue_chat(&self, _prior: &[ChatTurn], _message: &str) -> Result<String> {
            Err(anyhow!("chat backend down"))
        }
    }

    #[derive(Clone)]
    struct RecordingConversation {
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl RecordingConversation {
        fn new() -> Self {
            Self {
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl ConversationClient for RecordingConversation {
        fn name(&self) -> &str {
            "recording"
        }

        fn continue_chat(&self, prior: &[ChatTurn], message: &str) -> Result<String> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(prior.len());
            }
            Ok(format!("echo: {message}"))
        }
    }

    fn controller_with(
        generation: Box<dyn GenerationClient>,
        conversation: Box<dyn ConversationClient>,
    ) -> Result<(TempDir, SessionController)> {
        let dir = TempDir::new()?;
        let controller = SessionController::new(
            dir.path().join("out"),
            dir.path().join("events.jsonl"),
            generation,
            conversation,
        )?;
        Ok((dir, controller))
    }

    fn read_events(dir: &TempDir) -> Vec<Value> {
        let content = fs::read_to_string(dir.path().join("events.jsonl")).unwrap_or_default();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap_or(Value::Null))
            .collect()
    }

    fn png(tag: u8) -> EncodedImage {
        EncodedImage::new("image/png", vec![tag; 8])
    }

    fn drive_to_studio(controller: &mut SessionController) -> Result<()> {
        controller.select_pose("runway-walk")?;
        controller.attach_model_photo(png(1))?;
        assert_eq!(controller.generate_pose()?, None);
        controller.add_clothing(vec![png(2), png(3)])?;
        controller.advance_to_styling()?;
        Ok(())
    }

    #[test]
    fn pose_failure_keeps_the_step_and_records_the_error() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FailingGeneration), Box::new(CannedConversation))?;
        controller.select_pose("runway-walk")?;
        controller.attach_model_photo(png(1))?;

        let message = controller.generate_pose()?;
        assert_eq!(message.as_deref(), Some(POSE_FAILURE_MESSAGE));
        assert_eq!(controller.session().step(), WorkflowStep::PoseSelection);
        assert_eq!(controller.session().last_error(), Some(POSE_FAILURE_MESSAGE));

        let events = read_events(&dir);
        let failed = events
            .iter()
            .find(|event| event["type"] == "pose_generation_failed")
            .cloned()
            .unwrap_or(Value::Null);
        assert!(failed["error"]
            .as_str()
            .unwrap_or_default()
            .contains("backend unavailable"));
        Ok(())
    }

    #[test]
    fn pose_success_advances_to_clothing() -> Result<()> {
        let (_dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        controller.select_pose("runway-walk")?;
        controller.attach_model_photo(png(1))?;

        assert_eq!(controller.generate_pose()?, None);
        assert_eq!(controller.session().step(), WorkflowStep::ClothingEdit);
        assert!(controller.session().pose_image().is_some());
        assert!(controller.session().last_error().is_none());
        Ok(())
    }

    #[test]
    fn full_wizard_run_produces_a_saved_look() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        drive_to_studio(&mut controller)?;

        controller.update_settings(|settings| {
            settings.style_prompt = "Neon alley at night".to_string();
        })?;
        assert_eq!(controller.generate_look()?, None);
        assert_eq!(controller.session().step(), WorkflowStep::Result);

        let saved = controller.save_look(None)?;
        assert!(saved.exists());
        let name = saved
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or_default();
        assert!(name.starts_with("look-") && name.ends_with(".png"), "{name}");

        let look = controller.session().final_look().cloned();
        assert_eq!(fs::read(&saved)?, look.map(|image| image.bytes).unwrap_or_default());

        let events = read_events(&dir);
        assert!(events
            .iter()
            .any(|event| event["type"] == "look_generation_completed"));
        assert!(events.iter().any(|event| event["type"] == "look_saved"));
        Ok(())
    }

    #[test]
    fn stylist_sees_history_without_the_pending_message() -> Result<()> {
        let recording = RecordingConversation::new();
        let (_dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(recording.clone()))?;

        let mut transcript = Transcript::new();
        transcript.push_assistant(ASSISTANT_GREETING);

        let first = controller.chat(&mut transcript, "what angle suits a dress?")?;
        assert_eq!(first, "echo: what angle suits a dress?");
        let second = controller.chat(&mut transcript, "and the lighting?")?;
        assert_eq!(second, "echo: and the lighting?");

        let seen = recording.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen, vec![1, 3]);
        assert_eq!(transcript.len(), 5);
        Ok(())
    }

    #[test]
    fn chat_failure_apologizes_and_keeps_the_transcript() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(FailingConversation))?;

        let mut transcript = Transcript::new();
        let reply = controller.chat(&mut transcript, "hello?")?;
        assert_eq!(reply, CHAT_APOLOGY);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.turns()[1].text, CHAT_APOLOGY);

        let events = read_events(&dir);
        assert!(events.iter().any(|event| event["type"] == "chat_failed"));
        Ok(())
    }

    #[test]
    fn reset_switches_the_session_id_in_the_event_log() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        controller.select_pose("runway-walk")?;
        let old_id = controller.session().id().to_string();

        controller.reset_session()?;
        assert_eq!(controller.session().step(), WorkflowStep::PoseSelection);
        assert!(controller.session().selected_pose().is_none());
        assert_ne!(controller.session().id(), old_id);

        let events = read_events(&dir);
        let reset = events
            .iter()
            .find(|event| event["type"] == "session_reset")
            .cloned()
            .unwrap_or(Value::Null);
        assert_eq!(reset["previous_session_id"].as_str(), Some(old_id.as_str()));
        assert_eq!(
            reset["session_id"].as_str(),
            Some(controller.session().id())
        );
        Ok(())
    }

    #[test]
    fn missing_image_payload_is_flagged_in_events() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(EmptyPayloadGeneration), Box::new(CannedConversation))?;
        controller.select_pose("runway-walk")?;
        controller.attach_model_photo(png(1))?;

        let message = controller.generate_pose()?;
        assert_eq!(message.as_deref(), Some(POSE_FAILURE_MESSAGE));

        let events = read_events(&dir);
        let failed = events
            .iter()
            .find(|event| event["type"] == "pose_generation_failed")
            .cloned()
            .unwrap_or(Value::Null);
        assert_eq!(failed["missing_payload"], Value::Bool(true));
        assert_eq!(failed["transport"], Value::Bool(false));
        Ok(())
    }

    #[test]
    fn unknown_pose_is_rejected() -> Result<()> {
        let (_dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        let err = match controller.select_pose("backflip") {
            Ok(()) => panic!("unknown pose id should be rejected"),
            Err(err) => err,
        };
        assert!(err.to_string().contains("unknown pose"));
        Ok(())
    }

    #[test]
    fn settings_updates_are_step_locked() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        controller.select_pose("runway-walk")?;
        controller.attach_model_photo(png(1))?;
        assert_eq!(controller.generate_pose()?, None);

        let early = controller.update_settings(|settings| {
            settings.resolution = Resolution::FourK;
        });
        assert!(early.is_err());

        controller.add_clothing(vec![png(2)])?;
        controller.advance_to_styling()?;
        controller.update_settings(|settings| {
            settings.resolution = Resolution::FourK;
        })?;
        assert_eq!(controller.session().settings().resolution, Resolution::FourK);

        let events = read_events(&dir);
        let updated = events
            .iter()
            .find(|event| event["type"] == "settings_updated")
            .cloned()
            .unwrap_or(Value::Null);
        assert_eq!(updated["settings"]["resolution"], "4K");
        Ok(())
    }

    #[test]
    fn back_steps_are_logged_with_their_direction() -> Result<()> {
        let (dir, mut controller) =
            controller_with(Box::new(FixedGeneration), Box::new(CannedConversation))?;
        drive_to_studio(&mut controller)?;

        assert_eq!(controller.step_back()?, WorkflowStep::ClothingEdit);
        assert_eq!(controller.session().clothing().len(), 2);

        let events = read_events(&dir);
        let backward: Vec<&Value> = events
            .iter()
            .filter(|event| event["type"] == "step_changed" && event["direction"] == "back")
            .collect();
        assert_eq!(backward.len(), 1);
        assert_eq!(backward[0]["step"], "clothing_edit");
        Ok(())
    }
}
