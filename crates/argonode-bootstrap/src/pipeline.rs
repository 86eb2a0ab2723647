//! Bootstrap sequence
//!
//! Prepare the working directory, fetch binaries, write the proxy config,
//! launch processes, discover the tunnel hostname, then publish share
//! links. Any fatal step aborts the run; the HTTP server is not affected.

use anyhow::{Context, Result};
use argonode_api::SubscriptionCache;
use argonode_proto::{LinkBundle, ProxyConfigDocument};
use argonode_tunnel::{
    DiscoveryTimings, ProcessHandle, ProcessLauncher, TunnelDomainExtractor, TunnelProcess,
    TunnelSupervisor,
};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::arch::ArchitectureTag;
use crate::artifacts::{
    default_base_url, random_name, ArtifactDownloader, ArtifactPlan, ArtifactRole, FetchReport,
};
use crate::geo::{GeoProvider, IspResolver};
use crate::notify::UploadNotifier;
use crate::settings::Settings;
use crate::telemetry::TelemetryConfig;
use crate::workdir::{WorkDir, CLEANUP_DELAY};

/// What a successful run leaves behind
pub struct BootstrapReport {
    pub domain: String,
    pub links: LinkBundle,
    /// Proxy engine and monitoring agent
    pub processes: Vec<ProcessHandle>,
    pub tunnel: TunnelProcess,
    /// Resolves to the number of files removed after the grace period
    pub cleanup: JoinHandle<usize>,
}

pub struct Bootstrap {
    settings: Settings,
    cache: SubscriptionCache,
    client: reqwest::Client,
    artifact_base: Option<String>,
    geo_providers: Option<Vec<GeoProvider>>,
    auto_access_url: Option<String>,
    discovery_timings: DiscoveryTimings,
    cleanup_delay: Duration,
}

impl Bootstrap {
    pub fn new(settings: Settings, cache: SubscriptionCache) -> Self {
        let discovery_timings = DiscoveryTimings {
            max_rounds: settings.discovery_rounds.max(1),
            ..DiscoveryTimings::default()
        };

        Self {
            settings,
            cache,
            client: reqwest::Client::new(),
            artifact_base: None,
            geo_providers: None,
            auto_access_url: None,
            discovery_timings,
            cleanup_delay: CLEANUP_DELAY,
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Download binaries from `base_url` instead of the per-architecture host
    pub fn with_artifact_base(mut self, base_url: impl Into<String>) -> Self {
        self.artifact_base = Some(base_url.into());
        self
    }

    pub fn with_geo_providers(mut self, providers: Vec<GeoProvider>) -> Self {
        self.geo_providers = Some(providers);
        self
    }

    pub fn with_auto_access_url(mut self, url: impl Into<String>) -> Self {
        self.auto_access_url = Some(url.into());
        self
    }

    pub fn with_discovery_timings(mut self, timings: DiscoveryTimings) -> Self {
        self.discovery_timings = timings;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    fn notifier(&self) -> UploadNotifier {
        let notifier = UploadNotifier::new(self.client.clone(), self.settings.sub_path.clone())
            .with_upload_url(self.settings.upload_url())
            .with_project_url(self.settings.project_url())
            .with_auto_access(self.settings.auto_access);

        match &self.auto_access_url {
            Some(url) => notifier.with_auto_access_url(url.clone()),
            None => notifier,
        }
    }

    fn isp_resolver(&self) -> IspResolver {
        let resolver = IspResolver::new(self.client.clone());
        match &self.geo_providers {
            Some(providers) => resolver.with_providers(providers.clone()),
            None => resolver,
        }
    }

    /// Run the whole sequence once
    pub async fn run(self) -> Result<BootstrapReport> {
        let workdir = WorkDir::new(&self.settings.file_path);
        workdir
            .prepare()
            .await
            .context("Working directory is unavailable")?;

        let notifier = self.notifier();
        notifier.delete_stale_nodes(&workdir.sub_file()).await;
        workdir.clean_stale_files().await;

        let identity = self.settings.identity();
        let telemetry = self.settings.telemetry();

        let arch = ArchitectureTag::host();
        info!("Host architecture: {}", arch);

        let base_url = self
            .artifact_base
            .clone()
            .unwrap_or_else(|| default_base_url(arch));
        let plan = ArtifactPlan::plan_from(
            &base_url,
            telemetry.is_some(),
            telemetry.as_ref().map(|t| t.port.is_some()).unwrap_or(false),
            workdir.root(),
            |_| random_name(),
        );
        let fetched = ArtifactDownloader::new(self.client.clone())
            .fetch_plan(&plan)
            .await
            .context("Required binary could not be downloaded")?;

        let config = ProxyConfigDocument::generate(&identity)
            .to_pretty_json()
            .context("Failed to render proxy config")?;
        let config_file = workdir.config_file();
        workdir.write(&config_file, config).await?;
        info!("Proxy config written to {:?}", config_file);

        let launcher = ProcessLauncher::new().with_working_dir(workdir.root());
        let mut processes = Vec::new();

        if let Some(telemetry) = &telemetry {
            let agent = self
                .launch_telemetry(&launcher, &workdir, &plan, &fetched, telemetry)
                .await;
            processes.extend(agent);
        }

        let proxy = plan
            .get(ArtifactRole::ProxyEngine)
            .context("Proxy engine missing from plan")?;
        let proxy_args = vec!["-c".to_string(), config_file.display().to_string()];
        processes.push(
            launcher
                .spawn("proxy engine", &proxy.local_path, &proxy_args)
                .context("Proxy engine failed to start")?,
        );

        let mode = self
            .settings
            .tunnel_mode()
            .context("Tunnel auth is not usable")?;
        let tunnel_files = workdir.tunnel_files();
        mode.write_files(&tunnel_files)
            .await
            .context("Failed to write tunnel config")?;

        let tunnel_bin = plan
            .get(ArtifactRole::TunnelClient)
            .context("Tunnel client missing from plan")?;
        let mut tunnel = TunnelProcess::new(
            launcher.clone(),
            &tunnel_bin.local_path,
            mode.args(&tunnel_files),
        );
        if let Err(e) = tunnel.start().await {
            // Discovery restarts the client between rounds
            error!("{}", e);
        }

        let mut extractor = TunnelDomainExtractor::new(&tunnel_files.log_file)
            .with_timings(self.discovery_timings.clone())
            .with_static_domain(mode.static_domain().map(str::to_string));
        let domain = extractor
            .discover(&mut tunnel)
            .await
            .context("Tunnel hostname unavailable")?;

        let isp = self.isp_resolver().resolve().await;
        let links = LinkBundle::synthesize(&identity, &domain, &isp);
        publish_links(&self.cache, &workdir, &links).await?;

        notifier.upload(&workdir.list_file()).await;
        notifier.register_auto_access().await;

        let cleanup = workdir.schedule_cleanup(
            workdir.post_start_files(&plan.local_paths()),
            self.cleanup_delay,
        );

        info!("✅ Node is running on {}", domain);
        Ok(BootstrapReport {
            domain,
            links,
            processes,
            tunnel,
            cleanup,
        })
    }

    /// Start the monitoring agent; failures only disable monitoring
    async fn launch_telemetry(
        &self,
        launcher: &ProcessLauncher,
        workdir: &WorkDir,
        plan: &ArtifactPlan,
        fetched: &FetchReport,
        telemetry: &TelemetryConfig,
    ) -> Option<ProcessHandle> {
        let role = telemetry.role();
        let spec = plan.get(role).filter(|_| fetched.is_fetched(role))?;

        let config_file = workdir.telemetry_config();
        if let Err(e) = telemetry
            .write_config(&config_file, self.settings.uuid)
            .await
        {
            warn!("Monitoring disabled: {}", e);
            return None;
        }

        launcher
            .spawn(
                "monitoring agent",
                &spec.local_path,
                &telemetry.args(&config_file),
            )
            .map_err(|e| warn!("Monitoring disabled: {}", e))
            .ok()
    }
}

/// Make `links` visible: cache for the HTTP server, `sub.txt` for the next
/// run, `list.txt` for node uploads
pub async fn publish_links(
    cache: &SubscriptionCache,
    workdir: &WorkDir,
    links: &LinkBundle,
) -> Result<()> {
    cache.publish(links.combined_base64.clone());

    write_file(workdir, &workdir.sub_file(), &links.combined_base64).await?;
    write_file(workdir, &workdir.list_file(), &links.links().join("\n")).await?;

    info!("{}", links.combined_base64);
    info!("📄 Subscription saved to {:?}", workdir.sub_file());
    Ok(())
}

async fn write_file(workdir: &WorkDir, path: &Path, contents: &str) -> Result<()> {
    workdir
        .write(path, contents)
        .await
        .with_context(|| format!("Failed to persist {:?}", path))
}
