//! Help text for CLI commands.

/// Get help text for CLI commands.
#[must_use]
pub const fn help_text() -> &'static str {
    r#"Skill Evolution Commands:

  status SKILL        Show evolution status

  history SKILL [options]
                      Show the most recent execution records
    --limit, -l N       Maximum records to show (default: 20)

  practices SKILL     Show merged best practices

  rules SKILL         Show merged optimization rules

  snapshots SKILL     List configuration snapshots, newest first

  learn SKILL         Run a learning pass over stored history
                      (rules are reported as pending, never applied)

  apply SKILL CONFIG_PATH [--auto]
                      Apply stored rules to a configuration file
    --auto              Write rules; without it they are only listed

  rollback SKILL CONFIG_PATH VERSION
                      Restore a configuration snapshot

  help                Show this text

Environment:
  EVOLUTION_CONFIG    Path to a YAML or JSON document with an `evolution:` section
  LOG_LEVEL           Log filter for stderr output (default: info)

Examples:
  skill-evolution status web-search
  skill-evolution history web-search --limit 5
  skill-evolution apply web-search ./skills/web-search.yaml --auto
  skill-evolution rollback web-search ./skills/web-search.yaml 20260301T120000000000Z
"#
}
