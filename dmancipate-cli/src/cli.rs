//! Argument parsing for the `dmancipate` command.

use clap::{Parser, ValueEnum};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum CliAction {
    Talk,
    Attack,
    SkillCheck,
    UseItem,
    Look,
    PickUp,
    Ask,
    Reset,
    Review,
    UseSkill,
}

impl CliAction {
    /// Name sent in the `action` field.
    pub fn as_str(&self) -> &'static str {
        match self {
            CliAction::Talk => "talk",
            CliAction::Attack => "attack",
            CliAction::SkillCheck => "skill_check",
            CliAction::UseItem => "use_item",
            CliAction::Look => "look",
            CliAction::PickUp => "pick_up",
            CliAction::Ask => "ask",
            CliAction::Reset => "reset",
            CliAction::Review => "review",
            CliAction::UseSkill => "use_skill",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dmancipate",
    about = "DMancipate CLI - Interact with your DM chatbot",
    after_help = "Examples:
  dmancipate talk \"Hello DM, what do I see around me?\"
  dmancipate attack \"I swing my sword at the goblin\"
  dmancipate skill_check \"I try to pick the lock\"
  dmancipate ask \"What are the stats for a goblin?\"
  dmancipate reset    # Deletes all campaign history"
)]
pub struct Args {
    /// The action to perform
    #[arg(value_enum)]
    pub action: CliAction,

    /// The message to send to the DM (not used by reset)
    pub prompt: Option<String>,

    /// API server host
    #[arg(long, default_value = DEFAULT_HOST, env = "DMANCIPATE_HOST")]
    pub host: String,

    /// API server port
    #[arg(long, default_value_t = DEFAULT_PORT, env = "DMANCIPATE_PORT")]
    pub port: u16,

    /// Check if the API server is running and exit
    #[arg(long)]
    pub check_health: bool,

    /// Print the reply as it is generated
    #[arg(long)]
    pub stream: bool,
}

impl Args {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// The prompt, when one is required and present.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("dmancipate").chain(args.iter().copied()))
    }

    #[test]
    fn parses_action_and_prompt_with_defaults() {
        let args = parse(&["skill_check", "I try to pick the lock"]).unwrap();
        assert_eq!(args.action, CliAction::SkillCheck);
        assert_eq!(args.prompt(), Some("I try to pick the lock"));
        assert_eq!(args.base_url(), "http://localhost:5000");
        assert!(!args.check_health);
        assert!(!args.stream);
    }

    #[test]
    fn reset_needs_no_prompt() {
        let args = parse(&["reset", "--host", "dm.local", "--port", "8080"]).unwrap();
        assert_eq!(args.action, CliAction::Reset);
        assert_eq!(args.prompt(), None);
        assert_eq!(args.base_url(), "http://dm.local:8080");
    }

    #[test]
    fn rejects_unknown_actions() {
        assert!(parse(&["cast", "fireball"]).is_err());
        assert!(parse(&["Attack", "x"]).is_err());
    }

    #[test]
    fn wire_names_match_value_names() {
        for action in CliAction::value_variants() {
            let name = action.to_possible_value().unwrap();
            assert_eq!(name.get_name(), action.as_str());
        }
    }

    #[test]
    fn blank_prompt_counts_as_missing() {
        let args = parse(&["talk", "   "]).unwrap();
        assert_eq!(args.prompt(), None);
    }
}
