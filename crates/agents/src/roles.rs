//! The six-role team: prompts, tool subsets, and per-role iteration caps.

use mgx_domain::Framework;

/// Static description of one agent role.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Role identifier, also used as `agent_name` on events and messages.
    pub name: String,
    pub system_prompt: String,
    /// Names of the tools this role may call.
    pub tools: Vec<String>,
    pub max_tool_loops: u32,
}

fn decision_footer(actions: &str) -> String {
    format!(
        "\n\nWhen your work for this turn is complete, call the `record_decision` tool \
         with your next action. Valid actions for you: {actions}. Use 'end' only when \
         the user's request is fully handled."
    )
}

fn spec(name: &str, prompt: String, tools: &[&str], max_tool_loops: u32) -> AgentSpec {
    AgentSpec {
        name: name.to_owned(),
        system_prompt: prompt,
        tools: tools.iter().map(|t| (*t).to_owned()).collect(),
        max_tool_loops,
    }
}

/// Build the full team for a target framework, in graph order.
pub fn team_specs(framework: Framework) -> Vec<AgentSpec> {
    let fw = framework.as_str();

    vec![
        spec(
            "boss",
            format!(
                "You are the Boss of a software team building a {fw} web application. \
                 Distill the user's request into clear requirements and write them to \
                 requirements.md with the write_file tool. Be brief and concrete; if the \
                 request is trivial (a greeting, a question), answer directly and end the run.{}",
                decision_footer("continue (hand off to the product manager), end")
            ),
            &["read_file", "write_file", "record_decision"],
            6,
        ),
        spec(
            "product_manager",
            format!(
                "You are the Product Manager. Read requirements.md and author a product \
                 requirements document covering user stories, pages, and acceptance criteria. \
                 Write it to prd.md.{}",
                decision_footer("continue, back_to_boss (requirements unclear), end")
            ),
            &["read_file", "write_file", "record_decision"],
            6,
        ),
        spec(
            "architect",
            format!(
                "You are the Architect for a {fw} application. Read prd.md and produce the \
                 technical design: file layout, data model, API surface, and component \
                 structure. Write it to design.md.{}",
                decision_footer("continue, back_to_pm (PRD incomplete), end")
            ),
            &["read_file", "write_file", "list_dir", "record_decision"],
            6,
        ),
        spec(
            "project_manager",
            format!(
                "You are the Project Manager. Read design.md and break the work into an \
                 ordered task list with file-level granularity. Write it to tasks.md.{}",
                decision_footer(
                    "continue, back_to_architect (design gaps), back_to_pm (scope unclear), end"
                )
            ),
            &["read_file", "write_file", "record_decision"],
            6,
        ),
        spec(
            "engineer",
            format!(
                "You are the Engineer building a {fw} application. Work through tasks.md: \
                 create and edit source files with the workspace tools, install dependencies \
                 and run builds with run_command, and manage the dev server with \
                 start_dev_server / dev_server_status / stop_dev_server. Keep changes \
                 focused; prefer many small files over monoliths.{}",
                decision_footer(
                    "continue (hand off to QA), continue_development (more tasks remain), \
                     back_to_architect (design is wrong), end"
                )
            ),
            &[
                "read_file",
                "write_file",
                "list_dir",
                "make_dir",
                "delete_path",
                "grep_files",
                "run_command",
                "start_dev_server",
                "dev_server_status",
                "stop_dev_server",
                "record_decision",
            ],
            12,
        ),
        spec(
            "qa",
            format!(
                "You are QA. Verify the implementation against prd.md: inspect the code, \
                 run checks with run_command, observe the dev server with dev_server_status, \
                 and write your findings to test_report.md.{}",
                decision_footer("continue (approve and finish), back_to_engineer (defects found), end")
            ),
            &[
                "read_file",
                "list_dir",
                "grep_files",
                "run_command",
                "dev_server_status",
                "write_file",
                "record_decision",
            ],
            8,
        ),
    ]
}
