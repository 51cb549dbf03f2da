//! The fixed stage sequence and how each stage's child process is built.

use std::env;

/// One pipeline stage. Optional stages are skipped when the run's
/// `include_instagram` flag is off.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: &'static str,
    pub optional: bool,
    pub program: String,
    pub args: Vec<String>,
}

/// Stage order is fixed; commands come from environment overrides
/// (`GROUNDWIRE_<STAGE>_CMD`, whitespace-split) so scraper stages can
/// point at operator-supplied executables.
pub fn pipeline_stages() -> Vec<Stage> {
    vec![
        stage("twitter_scrape", false, "groundwire-twitter-scrape", &[]),
        stage(
            "instagram_scrape",
            true,
            "groundwire-instagram-scrape",
            &[],
        ),
        stage("post_process", false, "post-process", &[]),
        stage(
            "image_download",
            false,
            "media-fetch",
            &["--batch-size", &env_or("MEDIA_BATCH_SIZE", "200")],
        ),
        stage(
            "event_process",
            false,
            "event-process",
            &[
                "--max-workers",
                &env_or("EVENT_MAX_WORKERS", "6"),
                "--cooldown-seconds",
                &env_or("EVENT_WORKER_COOLDOWN", "60"),
                "--job-limit",
                &env_or("EVENT_POSTS_LIMIT", "5000"),
            ],
        ),
        stage(
            "event_dedup",
            false,
            "event-dedup",
            &["--live", "--limit", &env_or("DEDUP_GROUPS_LIMIT", "200")],
        ),
        stage(
            "twitter_profile_scrape",
            false,
            "groundwire-profile-scrape",
            &[],
        ),
        stage(
            "instagram_profile_scrape",
            true,
            "groundwire-instagram-profile-scrape",
            &[],
        ),
        stage("coordinate_backfill", false, "backfill-coordinates", &[]),
    ]
}

fn stage(name: &'static str, optional: bool, default_program: &str, default_args: &[&str]) -> Stage {
    let override_var = format!("GROUNDWIRE_{}_CMD", name.to_uppercase());
    if let Ok(command) = env::var(&override_var) {
        let mut parts = command.split_whitespace().map(str::to_string);
        if let Some(program) = parts.next() {
            return Stage {
                name,
                optional,
                program,
                args: parts.collect(),
            };
        }
    }

    Stage {
        name,
        optional,
        program: default_program.to_string(),
        args: default_args.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        let names: Vec<&str> = pipeline_stages().iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                "twitter_scrape",
                "instagram_scrape",
                "post_process",
                "image_download",
                "event_process",
                "event_dedup",
                "twitter_profile_scrape",
                "instagram_profile_scrape",
                "coordinate_backfill",
            ]
        );
    }

    #[test]
    fn instagram_stages_are_optional() {
        let stages = pipeline_stages();
        let optional: Vec<&str> = stages
            .iter()
            .filter(|s| s.optional)
            .map(|s| s.name)
            .collect();
        assert_eq!(optional, vec!["instagram_scrape", "instagram_profile_scrape"]);
    }
}
