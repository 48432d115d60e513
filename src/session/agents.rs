//! Agent panel projection.
//!
//! The panel shows what each agent is doing. It is never stored or mutated
//! on its own: every value comes from `(operation_type, phase,
//! publisher_status)`.

use serde::{Deserialize, Serialize};

use super::state::{OperationType, PublishStatus, StatusPhase};

pub const ORCHESTRATOR: &str = "maya";
pub const GAME_CREATOR: &str = "game_creator";
pub const PUBLISHER: &str = "publisher";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Active,
    Completed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentRecord {
    pub name: &'static str,
    pub status: AgentStatus,
    pub current_task: Option<&'static str>,
    pub last_activity: Option<&'static str>,
}

impl AgentRecord {
    fn idle(name: &'static str) -> Self {
        Self {
            name,
            status: AgentStatus::Idle,
            current_task: None,
            last_activity: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentPanel {
    pub agents: Vec<AgentRecord>,
}

impl AgentPanel {
    pub fn get(&self, name: &str) -> Option<&AgentRecord> {
        self.agents.iter().find(|agent| agent.name == name)
    }
}

/// Compute the agent panel for a state triple.
pub fn derive_agent_panel(
    operation_type: OperationType,
    phase: StatusPhase,
    publisher_status: PublishStatus,
) -> AgentPanel {
    let mut orchestrator = AgentRecord::idle(ORCHESTRATOR);
    let mut creator = AgentRecord::idle(GAME_CREATOR);
    let mut publisher = AgentRecord::idle(PUBLISHER);

    match operation_type {
        OperationType::Idle => {}
        OperationType::GameCreation => {
            let (status, task) = creator_activity(phase);
            creator.status = status;
            creator.current_task = task;
            creator.last_activity = Some(phase_label(phase));

            orchestrator.status = if status == AgentStatus::Active {
                AgentStatus::Active
            } else {
                AgentStatus::Completed
            };
            orchestrator.current_task = Some("Coordinating game creation");
            orchestrator.last_activity = Some("Delegated to game creator");
        }
        OperationType::Publishing => {
            let (status, task) = publisher_activity(publisher_status);
            publisher.status = status;
            publisher.current_task = task;
            publisher.last_activity = Some(publish_label(publisher_status));

            orchestrator.status = match status {
                AgentStatus::Active => AgentStatus::Active,
                AgentStatus::Error => AgentStatus::Error,
                _ => AgentStatus::Completed,
            };
            orchestrator.current_task = Some("Coordinating publishing");
            orchestrator.last_activity = Some("Delegated to publisher");
        }
    }

    AgentPanel {
        agents: vec![orchestrator, creator, publisher],
    }
}

fn creator_activity(phase: StatusPhase) -> (AgentStatus, Option<&'static str>) {
    match phase {
        StatusPhase::Idle => (AgentStatus::Idle, None),
        StatusPhase::Completed | StatusPhase::Suggesting => (AgentStatus::Completed, None),
        StatusPhase::Analyzing => (AgentStatus::Active, Some("Analyzing request")),
        StatusPhase::Thinking => (AgentStatus::Active, Some("Designing the game")),
        StatusPhase::Outlining => (AgentStatus::Active, Some("Outlining the build")),
        StatusPhase::Generating => (AgentStatus::Active, Some("Writing code")),
        StatusPhase::Previewing => (AgentStatus::Active, Some("Streaming preview")),
    }
}

fn publisher_activity(status: PublishStatus) -> (AgentStatus, Option<&'static str>) {
    match status {
        PublishStatus::Idle => (AgentStatus::Idle, None),
        PublishStatus::Validating => (AgentStatus::Active, Some("Validating game")),
        PublishStatus::Preparing => (AgentStatus::Active, Some("Preparing files")),
        PublishStatus::Deploying => (AgentStatus::Active, Some("Deploying site")),
        PublishStatus::Published => (AgentStatus::Completed, None),
        PublishStatus::Error => (AgentStatus::Error, None),
    }
}

fn phase_label(phase: StatusPhase) -> &'static str {
    match phase {
        StatusPhase::Idle => "Waiting",
        StatusPhase::Analyzing => "Analyzing",
        StatusPhase::Thinking => "Thinking",
        StatusPhase::Outlining => "Outlining",
        StatusPhase::Generating => "Generating",
        StatusPhase::Previewing => "Previewing",
        StatusPhase::Completed => "Completed",
        StatusPhase::Suggesting => "Suggesting",
    }
}

fn publish_label(status: PublishStatus) -> &'static str {
    match status {
        PublishStatus::Idle => "Waiting",
        PublishStatus::Validating => "Validating",
        PublishStatus::Preparing => "Preparing",
        PublishStatus::Deploying => "Deploying",
        PublishStatus::Published => "Published",
        PublishStatus::Error => "Failed",
    }
}
