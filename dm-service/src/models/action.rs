//! Player actions and the retrieval policy attached to each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A vector index the DM can draw context from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexName {
    #[serde(rename = "rules")]
    Rules,
    #[serde(rename = "monsters")]
    Monsters,
    #[serde(rename = "campaign-modules")]
    CampaignModules,
    #[serde(rename = "campaign-history")]
    CampaignHistory,
}

impl IndexName {
    pub const ALL: [IndexName; 4] = [
        IndexName::Rules,
        IndexName::Monsters,
        IndexName::CampaignModules,
        IndexName::CampaignHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Rules => "rules",
            IndexName::Monsters => "monsters",
            IndexName::CampaignModules => "campaign-modules",
            IndexName::CampaignHistory => "campaign-history",
        }
    }

    /// Heading used when the index's passages are placed in a prompt.
    pub fn heading(&self) -> &'static str {
        match self {
            IndexName::Rules => "Relevant rules",
            IndexName::Monsters => "Monster statistics",
            IndexName::CampaignModules => "Campaign module",
            IndexName::CampaignHistory => "Campaign history",
        }
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IndexName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IndexName::ALL
            .into_iter()
            .find(|index| index.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unknown index '{}'. Known indexes: {}",
                    s,
                    IndexName::ALL.map(|i| i.as_str()).join(", ")
                )
            })
    }
}

/// What the player declares they are doing this turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
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

/// How the DM gathers context for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextPolicy {
    pub indexes: &'static [IndexName],
    pub instruction: &'static str,
    /// Condense retrieved passages through a second LLM call.
    pub summarize: bool,
    /// Write the reply back into the campaign history index.
    pub persist: bool,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::Talk,
        Action::Attack,
        Action::SkillCheck,
        Action::UseItem,
        Action::Look,
        Action::PickUp,
        Action::Ask,
        Action::Reset,
        Action::Review,
        Action::UseSkill,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Talk => "talk",
            Action::Attack => "attack",
            Action::SkillCheck => "skill_check",
            Action::UseItem => "use_item",
            Action::Look => "look",
            Action::PickUp => "pick_up",
            Action::Ask => "ask",
            Action::Reset => "reset",
            Action::Review => "review",
            Action::UseSkill => "use_skill",
        }
    }

    /// Actions accepted by `POST /chat`. `reset` is served by `DELETE /chat`.
    pub fn is_chat_action(&self) -> bool {
        !matches!(self, Action::Reset)
    }

    pub fn chat_actions() -> impl Iterator<Item = Action> {
        Action::ALL.into_iter().filter(Action::is_chat_action)
    }

    pub fn policy(&self) -> ContextPolicy {
        use IndexName::*;

        match self {
            Action::Talk => ContextPolicy {
                indexes: &[CampaignModules, CampaignHistory],
                instruction: "The player is speaking. Voice the characters they address and keep \
                              their personalities consistent with the campaign.",
                summarize: false,
                persist: true,
            },
            Action::Attack => ContextPolicy {
                indexes: &[Rules, Monsters],
                instruction: "The player attacks. Resolve the attack with the combat rules and the \
                              target's statistics, state the rolls required, then narrate the outcome.",
                summarize: false,
                persist: true,
            },
            Action::SkillCheck => ContextPolicy {
                indexes: &[Rules, CampaignHistory],
                instruction: "The player attempts a skill check. Name the ability and skill, set a \
                              difficulty class, and narrate success and failure outcomes.",
                summarize: false,
                persist: true,
            },
            Action::UseItem => ContextPolicy {
                indexes: &[Rules, CampaignHistory],
                instruction: "The player uses an item. Apply the item's rules and describe its effect.",
                summarize: false,
                persist: true,
            },
            Action::Look => ContextPolicy {
                indexes: &[CampaignModules, CampaignHistory],
                instruction: "The player looks around. Describe what their character perceives.",
                summarize: false,
                persist: true,
            },
            Action::PickUp => ContextPolicy {
                indexes: &[CampaignHistory],
                instruction: "The player picks something up. Confirm what they now carry and any \
                              consequence of taking it.",
                summarize: false,
                persist: true,
            },
            Action::Ask => ContextPolicy {
                indexes: &[Rules, Monsters],
                instruction: "The player asks an out-of-character question. Answer it directly from \
                              the rules and statistics provided.",
                summarize: false,
                persist: true,
            },
            Action::Review => ContextPolicy {
                indexes: &[CampaignHistory],
                instruction: "The player asks for a recap. Summarize the campaign so far, focusing on \
                              what they asked about.",
                summarize: true,
                persist: false,
            },
            Action::UseSkill => ContextPolicy {
                indexes: &[Rules, Monsters],
                instruction: "The player uses a class feature, spell or skill. Apply its rules, \
                              including effects on any creature targeted, then narrate.",
                summarize: false,
                persist: true,
            },
            Action::Reset => ContextPolicy {
                indexes: &[],
                instruction: "",
                summarize: false,
                persist: false,
            },
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Invalid action: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_wire_names() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
        assert!("Attack".parse::<Action>().is_err());
        assert!("cast".parse::<Action>().is_err());
    }

    #[test]
    fn reset_is_not_a_chat_action() {
        let chat: Vec<Action> = Action::chat_actions().collect();
        assert_eq!(chat.len(), 9);
        assert!(!chat.contains(&Action::Reset));
    }

    #[test]
    fn every_policy_queries_at_most_two_indexes() {
        for action in Action::ALL {
            assert!(action.policy().indexes.len() <= 2, "{action}");
        }
    }

    #[test]
    fn only_review_skips_persistence_among_chat_actions() {
        for action in Action::chat_actions() {
            assert_eq!(action.policy().persist, action != Action::Review, "{action}");
        }
    }

    #[test]
    fn combat_actions_consult_rules_and_monsters() {
        let policy = Action::Attack.policy();
        assert_eq!(policy.indexes, &[IndexName::Rules, IndexName::Monsters]);
    }

    #[test]
    fn index_names_round_trip_through_display() {
        for index in IndexName::ALL {
            assert_eq!(index.to_string().parse::<IndexName>().unwrap(), index);
        }
    }
}
