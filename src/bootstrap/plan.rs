//! Instance boot provisioning as an ordered list of named steps.
//!
//! Each step is a small, idempotent piece of shell. The plan renders them
//! in order into a user-data script; the script itself only stages and
//! launches the bootstrap archive, keeping user-data under the EC2 limit.

use thiserror::Error;

/// EC2 rejects user-data larger than 16 KiB.
pub const USER_DATA_LIMIT_BYTES: usize = 16 * 1024;

const STAGE_DIR: &str = "/var/tmp/hytale-bootstrap";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("duplicate provisioning step `{0}`")]
    DuplicateStep(String),
    #[error("rendered user-data is {size} bytes; the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionStep {
    pub name: String,
    pub commands: Vec<String>,
}

impl ProvisionStep {
    pub fn new(name: impl Into<String>, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }
}

/// Inputs for the instance user-data.
#[derive(Debug, Clone)]
pub struct UserDataOptions {
    pub bootstrap_bucket: String,
    pub bootstrap_key: String,
    pub downloader_bucket: String,
    pub downloader_key: String,
    pub backup_bucket: String,
    pub webhook_secret_arn: Option<String>,
    pub data_volume_size_gib: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionPlan {
    steps: Vec<ProvisionStep>,
}

impl ProvisionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step. Names must be unique within the plan.
    pub fn push(&mut self, step: ProvisionStep) -> Result<(), PlanError> {
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(PlanError::DuplicateStep(step.name));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn steps(&self) -> &[ProvisionStep] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&ProvisionStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// The user-data sequence: fetch the bootstrap archive and hand over to
    /// its `bootstrap.sh`.
    pub fn instance_user_data(opts: &UserDataOptions) -> Result<Self, PlanError> {
        let archive = format!("{STAGE_DIR}/bootstrap.zip");
        let script = format!("{STAGE_DIR}/bootstrap.sh");

        let env = [
            ("DOWNLOADER_ASSET_BUCKET", opts.downloader_bucket.clone()),
            ("DOWNLOADER_ASSET_KEY", opts.downloader_key.clone()),
            ("BACKUP_BUCKET_NAME", opts.backup_bucket.clone()),
            (
                "DISCORD_WEBHOOK_SECRET_ARN",
                opts.webhook_secret_arn.clone().unwrap_or_default(),
            ),
            (
                "DATA_VOLUME_SIZE_GIB",
                opts.data_volume_size_gib
                    .map(|gib| gib.to_string())
                    .unwrap_or_default(),
            ),
        ];
        let mut launch: Vec<String> = env
            .iter()
            .map(|(name, value)| format!("{name}={}", shell_quote(value)))
            .collect();
        launch.push(format!("bash {script}"));

        let mut plan = Self::new();
        plan.push(ProvisionStep::new(
            "log-output",
            ["exec > >(tee /var/log/user-data.log | logger -t user-data -s 2>/dev/console) 2>&1"],
        ))?;
        plan.push(ProvisionStep::new("strict-mode", ["set -euxo pipefail"]))?;
        plan.push(ProvisionStep::new(
            "install-packages",
            ["dnf install -y --allowerasing awscli unzip"],
        ))?;
        plan.push(ProvisionStep::new("stage-dir", [format!("mkdir -p {STAGE_DIR}")]))?;
        plan.push(ProvisionStep::new(
            "fetch-bootstrap",
            [format!(
                "aws s3 cp {} {archive}",
                shell_quote(&format!("s3://{}/{}", opts.bootstrap_bucket, opts.bootstrap_key))
            )],
        ))?;
        plan.push(ProvisionStep::new(
            "unpack-bootstrap",
            [format!("unzip -o {archive} -d {STAGE_DIR}")],
        ))?;
        plan.push(ProvisionStep::new("mark-executable", [format!("chmod +x {script}")]))?;
        plan.push(ProvisionStep::new("run-bootstrap", [launch.join(" ")]))?;
        Ok(plan)
    }

    /// Render the plan as a bash script, one commented block per step.
    pub fn render(&self) -> Result<String, PlanError> {
        let mut out = String::from("#!/bin/bash\n");
        for step in &self.steps {
            out.push_str(&format!("# step: {}\n", step.name));
            for command in &step.commands {
                out.push_str(command);
                out.push('\n');
            }
        }
        if out.len() > USER_DATA_LIMIT_BYTES {
            return Err(PlanError::TooLarge {
                size: out.len(),
                limit: USER_DATA_LIMIT_BYTES,
            });
        }
        Ok(out)
    }
}

/// Single-quote `value` for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> UserDataOptions {
        UserDataOptions {
            bootstrap_bucket: "cdk-assets".into(),
            bootstrap_key: "abc123.zip".into(),
            downloader_bucket: "cdk-assets".into(),
            downloader_key: "def456.zip".into(),
            backup_bucket: "hytale-backups".into(),
            webhook_secret_arn: None,
            data_volume_size_gib: Some(30),
        }
    }

    #[test]
    fn steps_come_out_in_dependency_order() {
        let plan = ProvisionPlan::instance_user_data(&options()).unwrap();

        let names: Vec<&str> = plan.steps().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "log-output",
                "strict-mode",
                "install-packages",
                "stage-dir",
                "fetch-bootstrap",
                "unpack-bootstrap",
                "mark-executable",
                "run-bootstrap",
            ]
        );
    }

    #[test]
    fn launch_step_passes_quoted_environment() {
        let mut opts = options();
        opts.webhook_secret_arn = Some("arn:aws:secretsmanager:x:1:secret:it's".into());
        let plan = ProvisionPlan::instance_user_data(&opts).unwrap();

        let launch = &plan.step("run-bootstrap").unwrap().commands[0];

        assert!(launch.starts_with("DOWNLOADER_ASSET_BUCKET='cdk-assets' "));
        assert!(launch.contains("BACKUP_BUCKET_NAME='hytale-backups'"));
        assert!(launch.contains(r"DISCORD_WEBHOOK_SECRET_ARN='arn:aws:secretsmanager:x:1:secret:it'\''s'"));
        assert!(launch.contains("DATA_VOLUME_SIZE_GIB='30'"));
        assert!(launch.ends_with("bash /var/tmp/hytale-bootstrap/bootstrap.sh"));
    }

    #[test]
    fn absent_optionals_render_empty() {
        let mut opts = options();
        opts.data_volume_size_gib = None;
        let plan = ProvisionPlan::instance_user_data(&opts).unwrap();

        let launch = &plan.step("run-bootstrap").unwrap().commands[0];

        assert!(launch.contains("DISCORD_WEBHOOK_SECRET_ARN='' "));
        assert!(launch.contains("DATA_VOLUME_SIZE_GIB='' "));
    }

    #[test]
    fn render_marks_each_step() {
        let script = ProvisionPlan::instance_user_data(&options())
            .unwrap()
            .render()
            .unwrap();

        assert!(script.starts_with("#!/bin/bash\n# step: log-output\nexec > >(tee"));
        assert!(script.contains(
            "# step: fetch-bootstrap\naws s3 cp 's3://cdk-assets/abc123.zip' /var/tmp/hytale-bootstrap/bootstrap.zip\n"
        ));
        assert_eq!(script.matches("# step: ").count(), 8);
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let mut plan = ProvisionPlan::new();
        plan.push(ProvisionStep::new("stage-dir", ["mkdir -p /a"])).unwrap();

        let err = plan
            .push(ProvisionStep::new("stage-dir", ["mkdir -p /b"]))
            .unwrap_err();

        assert_eq!(err, PlanError::DuplicateStep("stage-dir".into()));
        assert_eq!(plan.steps().len(), 1);
    }

    #[test]
    fn oversized_user_data_is_rejected() {
        let mut plan = ProvisionPlan::new();
        plan.push(ProvisionStep::new("huge", ["x".repeat(USER_DATA_LIMIT_BYTES)]))
            .unwrap();

        assert!(matches!(plan.render(), Err(PlanError::TooLarge { .. })));
    }
}
