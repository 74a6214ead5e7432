use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use atelier_contracts::catalog::PoseCatalog;
use atelier_contracts::session::{WorkflowStep, MAX_CLOTHING_IMAGES};
use atelier_contracts::settings::{AspectRatio, CameraAngle, Resolution};
use atelier_contracts::transcript::Transcript;
use atelier_contracts::wizard::{parse_intent, WIZARD_HELP_COMMANDS};
use atelier_engine::{
    read_image, read_image_batch, ConversationClient, DryrunConversationClient,
    DryrunGenerationClient, GeminiConversationClient, GeminiGenerationClient, GenerationClient,
    SessionController, ASSISTANT_GREETING, DEFAULT_BATCH_TIMEOUT, DEFAULT_IMAGE_MODEL,
    DEFAULT_TEXT_MODEL,
};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, Parser)]
#[command(name = "atelier", version, about = "Fashion shoot wizard CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive four-step shoot: pose, clothing, studio, result.
    Shoot(ShootArgs),
    /// List the pose catalog and exit.
    Poses,
}

#[derive(Debug, Parser)]
struct ShootArgs {
    #[arg(long, default_value = "shoot-out")]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_IMAGE_MODEL)]
    image_model: String,
    #[arg(long, default_value = DEFAULT_TEXT_MODEL)]
    text_model: String,
    /// Render synthetic images locally instead of calling Gemini.
    #[arg(long)]
    offline: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("atelier error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Shoot(args) => run_shoot(args),
        Command::Poses => {
            print_poses(&PoseCatalog::default());
            Ok(0)
        }
    }
}

fn run_shoot(args: ShootArgs) -> Result<i32> {
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let (generation, conversation): (Box<dyn GenerationClient>, Box<dyn ConversationClient>) =
        if args.offline {
            (
                Box::new(DryrunGenerationClient),
                Box::new(DryrunConversationClient),
            )
        } else {
            (
                Box::new(GeminiGenerationClient::new(Some(args.image_model.clone()))),
                Box::new(GeminiConversationClient::new(Some(args.text_model.clone()))),
            )
        };
    let mut controller = SessionController::new(&args.out, &events_path, generation, conversation)?;

    let mut transcript = Transcript::new();
    transcript.push_assistant(ASSISTANT_GREETING);

    println!("Atelier shoot started. Type /help for commands.");
    println!("stylist: {ASSISTANT_GREETING}");
    print_status(&controller);

    let stdin = io::stdin();
    let mut line = String::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        match intent.action.as_str() {
            "noop" => continue,
            "quit" => break,
            "help" => {
                println!("Commands: {}", WIZARD_HELP_COMMANDS.join(" "));
            }
            "list_poses" => print_poses(controller.catalog()),
            "status" => print_status(&controller),
            "select_pose" => {
                let Some(pose_id) = value_as_non_empty_string(intent.command_args.get("pose"))
                else {
                    println!("/pose requires a pose id (see /poses)");
                    continue;
                };
                match controller.select_pose(&pose_id) {
                    Ok(()) => {
                        let name = controller
                            .session()
                            .selected_pose()
                            .map(|pose| pose.name.clone())
                            .unwrap_or(pose_id);
                        println!("Pose set to {name}");
                    }
                    Err(err) => println!("Pose selection failed: {err:#}"),
                }
            }
            "attach_photo" => {
                let Some(path) = value_as_non_empty_string(intent.command_args.get("path")) else {
                    println!("/photo requires a path");
                    continue;
                };
                let attached = read_image(Path::new(&path))
                    .and_then(|photo| controller.attach_model_photo(photo));
                match attached {
                    Ok(()) => println!("Model photo attached ({path})"),
                    Err(err) => println!("Photo intake failed: {err:#}"),
                }
            }
            "add_clothing" => {
                let paths = value_path_list(intent.command_args.get("paths"));
                if paths.is_empty() {
                    println!("/add requires at least one path");
                    continue;
                }
                let offered = paths.len();
                let added = read_image_batch(&paths, DEFAULT_BATCH_TIMEOUT)
                    .and_then(|batch| controller.add_clothing(batch));
                match added {
                    Ok(kept) => {
                        if kept < offered {
                            println!("Kept {kept} of {offered} (cap is {MAX_CLOTHING_IMAGES}).");
                        }
                        println!(
                            "Clothing photos: {}/{}",
                            controller.session().clothing().len(),
                            MAX_CLOTHING_IMAGES
                        );
                    }
                    Err(err) => println!("Clothing intake failed: {err:#}"),
                }
            }
            "remove_clothing" => {
                let raw = value_as_non_empty_string(intent.command_args.get("index"));
                let Some(position) = parse_position(raw.as_deref()) else {
                    println!("/remove requires a position between 1 and {MAX_CLOTHING_IMAGES}");
                    continue;
                };
                match controller.remove_clothing(position - 1) {
                    Ok(()) => println!(
                        "Removed photo {position}; {} left.",
                        controller.session().clothing().len()
                    ),
                    Err(err) => println!("Remove failed: {err:#}"),
                }
            }
            "update_settings" => {
                match apply_settings_update(&mut controller, &intent.settings_update) {
                    Ok(()) => print_settings(&controller),
                    Err(err) => println!("Settings update failed: {err:#}"),
                }
            }
            "generate" => {
                let outcome = match controller.session().step() {
                    WorkflowStep::PoseSelection => controller.generate_pose(),
                    WorkflowStep::FinalGeneration => controller.generate_look(),
                    WorkflowStep::ClothingEdit => {
                        println!("Nothing to render here; /next moves on to the studio.");
                        continue;
                    }
                    WorkflowStep::Result => {
                        println!("The look is ready; /save writes it, /new starts over.");
                        continue;
                    }
                };
                match outcome {
                    Ok(None) => {
                        println!("Generation complete.");
                        print_status(&controller);
                    }
                    Ok(Some(message)) => println!("Generation failed: {message}"),
                    Err(err) => println!("Generation failed: {err:#}"),
                }
            }
            "next_step" => match controller.advance_to_styling() {
                Ok(()) => print_status(&controller),
                Err(err) => println!("Cannot continue: {err:#}"),
            },
            "back_step" => match controller.step_back() {
                Ok(step) => println!("Back on the {} step.", step.title()),
                Err(err) => println!("Cannot go back: {err:#}"),
            },
            "save_look" => {
                let path = value_as_non_empty_string(intent.command_args.get("path"))
                    .map(PathBuf::from);
                match controller.save_look(path.as_deref()) {
                    Ok(saved) => println!("Saved {}", saved.display()),
                    Err(err) => println!("Save failed: {err:#}"),
                }
            }
            "new_session" => {
                print!("Start over and drop the current shoot? [y/N] ");
                io::stdout().flush()?;
                let mut answer = String::new();
                stdin.read_line(&mut answer)?;
                if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                    match controller.reset_session() {
                        Ok(()) => {
                            println!("New session started.");
                            print_status(&controller);
                        }
                        Err(err) => println!("Reset failed: {err:#}"),
                    }
                } else {
                    println!("Keeping the current session.");
                }
            }
            "chat" => {
                let Some(message) = intent.message.as_deref() else {
                    continue;
                };
                match controller.chat(&mut transcript, message) {
                    Ok(reply) => println!("stylist: {reply}"),
                    Err(err) => println!("Chat failed: {err:#}"),
                }
            }
            _ => {
                let command = value_as_non_empty_string(intent.command_args.get("command"))
                    .unwrap_or_default();
                println!("Unknown command: /{command} (try /help)");
            }
        }
    }

    controller.finish()?;
    Ok(0)
}

fn apply_settings_update(
    controller: &mut SessionController,
    update: &BTreeMap<String, Value>,
) -> Result<()> {
    for (key, value) in update {
        let raw = value.as_str().unwrap_or_default().trim().to_string();
        match key.as_str() {
            "camera_angle" => {
                let angle = CameraAngle::parse(&raw)?;
                controller.update_settings(|settings| settings.camera_angle = angle)?;
            }
            "resolution" => {
                let resolution = Resolution::parse(&raw)?;
                controller.update_settings(|settings| settings.resolution = resolution)?;
            }
            "aspect_ratio" => {
                let ratio = AspectRatio::parse(&raw)?;
                controller.update_settings(|settings| settings.aspect_ratio = ratio)?;
            }
            "style_prompt" => {
                if raw.is_empty() {
                    bail!("/style requires a prompt");
                }
                controller.update_settings(|settings| settings.style_prompt = raw.clone())?;
            }
            other => bail!("unknown setting '{other}'"),
        }
    }
    Ok(())
}

fn print_status(controller: &SessionController) {
    let session = controller.session();
    let step = session.step();
    println!(
        "Step {}/{}: {}",
        step.sequence_index() + 1,
        WorkflowStep::ALL.len(),
        step_line(step)
    );
    match session.selected_pose() {
        Some(pose) => println!("  pose: {} ({})", pose.name, pose.id),
        None => println!("  pose: none (pick one with /pose)"),
    }
    println!(
        "  model photo: {}",
        presence(session.model_photo().is_some())
    );
    println!(
        "  pose render: {}",
        presence(session.pose_image().is_some())
    );
    println!(
        "  clothing: {}/{}",
        session.clothing().len(),
        MAX_CLOTHING_IMAGES
    );
    print_settings(controller);
    println!(
        "  final look: {}",
        presence(session.final_look().is_some())
    );
    if let Some(error) = session.last_error() {
        println!("  last error: {error}");
    }
}

/// All four steps in order with the current one bracketed, plus the
/// completed fraction.
fn step_line(current: WorkflowStep) -> String {
    let steps: Vec<String> = WorkflowStep::ALL
        .into_iter()
        .map(|step| {
            if step == current {
                format!("[{}]", step.title())
            } else {
                step.title().to_string()
            }
        })
        .collect();
    format!(
        "{} ({}%)",
        steps.join(" > "),
        current.sequence_index() * 100 / (WorkflowStep::ALL.len() - 1)
    )
}

fn print_settings(controller: &SessionController) {
    let settings = controller.session().settings();
    println!(
        "  settings: {} | {} | {} | {}",
        settings.camera_angle.as_str(),
        settings.resolution.as_str(),
        settings.aspect_ratio.as_str(),
        settings.style_prompt
    );
}

fn print_poses(catalog: &PoseCatalog) {
    println!("Poses:");
    for pose in catalog.list() {
        println!("  {:<16} {:<20} {}", pose.id, pose.name, pose.description);
    }
}

fn presence(present: bool) -> &'static str {
    if present {
        "ready"
    } else {
        "missing"
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn value_path_list(value: Option<&Value>) -> Vec<PathBuf> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|item| !item.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_position(raw: Option<&str>) -> Option<usize> {
    raw?.parse::<usize>().ok().filter(|value| *value >= 1)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        parse_position, step_line, value_as_non_empty_string, value_path_list, WorkflowStep,
    };

    #[test]
    fn non_empty_string_trims_and_rejects_blanks() {
        assert_eq!(
            value_as_non_empty_string(Some(&json!("  runway-walk  "))),
            Some("runway-walk".to_string())
        );
        assert_eq!(value_as_non_empty_string(Some(&json!("   "))), None);
        assert_eq!(value_as_non_empty_string(Some(&json!(42))), None);
        assert_eq!(value_as_non_empty_string(None), None);
    }

    #[test]
    fn path_list_skips_non_strings_and_empties() {
        let value = json!(["a.png", "", 3, "b dress.png"]);
        let paths = value_path_list(Some(&value));
        let rendered: Vec<String> = paths
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect();
        assert_eq!(rendered, vec!["a.png", "b dress.png"]);
        assert!(value_path_list(None).is_empty());
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(parse_position(Some("1")), Some(1));
        assert_eq!(parse_position(Some("8")), Some(8));
        assert_eq!(parse_position(Some("0")), None);
        assert_eq!(parse_position(Some("three")), None);
        assert_eq!(parse_position(None), None);
    }

    #[test]
    fn step_line_marks_the_current_step() {
        assert_eq!(
            step_line(WorkflowStep::PoseSelection),
            "[Pose] > Clothing > Studio > Result (0%)"
        );
        assert_eq!(
            step_line(WorkflowStep::ClothingEdit),
            "Pose > [Clothing] > Studio > Result (33%)"
        );
        assert_eq!(
            step_line(WorkflowStep::Result),
            "Pose > Clothing > Studio > [Result] (100%)"
        );
    }
}
