//! List Command

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use ezyscribe_common::Role;
use ezyscribe_e2e::flows::{ScenarioInfo, CATALOGUE};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ListArgs {
    /// Only scenarios available to this role
    #[arg(short, long)]
    pub role: Option<Role>,

    /// Only scenarios with this tag
    #[arg(short, long)]
    pub tag: Option<String>,
}

/// Catalogue entry display wrapper for serialization
#[derive(Serialize)]
pub struct ScenarioDisplay {
    pub name: String,
    pub roles: Vec<String>,
    pub tags: Vec<String>,
    pub description: String,
}

impl From<&ScenarioInfo> for ScenarioDisplay {
    fn from(info: &ScenarioInfo) -> Self {
        Self {
            name: info.name.to_string(),
            roles: info.roles.iter().map(|r| r.to_string()).collect(),
            tags: info.tags.iter().map(|t| t.to_string()).collect(),
            description: info.description.to_string(),
        }
    }
}

impl TableDisplay for ScenarioDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Roles", "Tags", "Description"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.roles.join(", "),
            self.tags.join(", "),
            self.description.clone(),
        ]
    }
}

pub fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    let displays: Vec<ScenarioDisplay> = CATALOGUE
        .iter()
        .filter(|info| args.role.map_or(true, |role| info.applies_to(role)))
        .filter(|info| args.tag.as_deref().map_or(true, |tag| info.has_tag(tag)))
        .map(ScenarioDisplay::from)
        .collect();

    print_list(&displays, format);
    Ok(())
}
