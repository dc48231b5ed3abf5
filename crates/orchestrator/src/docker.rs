//! Docker execution backend (bollard).

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;

use mgx_domain::config::{OrchestratorConfig, WorkspaceConfig};
use mgx_domain::{Error, Result, Session};

use crate::executor::{ExecutionHandle, Executor, ExecutorState};
use crate::spec::ContainerSpec;

pub struct DockerExecutor {
    docker: Docker,
    orchestrator: OrchestratorConfig,
    workspace: WorkspaceConfig,
    database_url: String,
}

fn docker_err(e: bollard::errors::Error) -> Error {
    Error::Other(format!("docker: {e}"))
}

fn is_not_found(e: &bollard::errors::Error) -> bool {
    matches!(
        e,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

impl DockerExecutor {
    pub fn connect(
        orchestrator: OrchestratorConfig,
        workspace: WorkspaceConfig,
        database_url: String,
    ) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(docker_err)?;
        Ok(Self {
            docker,
            orchestrator,
            workspace,
            database_url,
        })
    }

    async fn remove_if_present(&self, name: &str) -> Result<()> {
        match self
            .docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(docker_err(e)),
        }
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn launch(&self, session: &Session) -> Result<ExecutionHandle> {
        let spec = ContainerSpec::build(
            &self.orchestrator,
            &self.workspace,
            session,
            &self.database_url,
        );

        // A leftover container with the deterministic name belongs to a
        // previous run of this session.
        self.remove_if_present(&spec.name).await?;

        let config = ContainerConfig {
            image: Some(spec.image.clone()),
            env: Some(spec.env.clone()),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                memory: Some(spec.memory_bytes),
                nano_cpus: Some(spec.nano_cpus),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(docker_err)?;
        self.docker
            .start_container(&spec.name, None::<StartContainerOptions<String>>)
            .await
            .map_err(docker_err)?;

        tracing::info!(
            session_id = %session.id,
            container = %spec.name,
            image = %spec.image,
            "agent container started"
        );
        Ok(ExecutionHandle { id: spec.name })
    }

    async fn state(&self, handle: &ExecutionHandle) -> Result<ExecutorState> {
        match self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => {
                let state = info.state.unwrap_or_default();
                if state.running.unwrap_or(false) {
                    Ok(ExecutorState::Running)
                } else {
                    Ok(ExecutorState::Exited {
                        exit_code: state.exit_code,
                    })
                }
            }
            // auto_remove reaps the container on exit; gone means exited.
            Err(e) if is_not_found(&e) => Ok(ExecutorState::Exited { exit_code: None }),
            Err(e) => Err(docker_err(e)),
        }
    }

    async fn stop(&self, handle: &ExecutionHandle) -> Result<()> {
        match self
            .docker
            .stop_container(
                &handle.id,
                Some(StopContainerOptions {
                    t: self.orchestrator.stop_grace_sec as i64,
                }),
            )
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(docker_err(e)),
        }
    }

    async fn cleanup(&self, handle: &ExecutionHandle) -> Result<()> {
        self.remove_if_present(&handle.id).await
    }
}
