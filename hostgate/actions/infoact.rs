use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Networks, ProcessesToUpdate, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::{task::spawn_blocking, time::sleep};
use tracing::{debug, warn};

use crate::{
    actions::{ActionKind, ExecutionResult, ResultDetail, ValidatedAction},
    agents::{ActionExecutor, ExecutionContext},
};

/// Operating system identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OsInfo {
    /// OS name.
    pub name: Option<String>,
    /// OS version.
    pub version: Option<String>,
    /// Human readable name and version.
    pub long_version: Option<String>,
    /// Kernel version.
    pub kernel: Option<String>,
    /// Host name.
    pub hostname: Option<String>,
    /// CPU architecture the binary was built for.
    pub arch: String,
}

/// Memory usage in bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryInfo {
    /// Installed memory.
    pub total: u64,
    /// Memory available to new processes.
    pub available: u64,
    /// Memory in use.
    pub used: u64,
    /// Share of memory not available, 0-100.
    pub percent: f64,
}

/// Usage of one mounted partition, in bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskInfo {
    /// Device name.
    pub device: String,
    /// Mount point.
    pub mountpoint: String,
    /// File system type.
    pub fstype: String,
    /// Capacity.
    pub total: u64,
    /// Used space.
    pub used: u64,
    /// Space available to the current user.
    pub free: u64,
    /// Used share, 0-100.
    pub percent: f64,
}

/// Processor counts and utilisation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CpuInfo {
    /// Logical processors.
    pub count: usize,
    /// Physical cores, when known.
    pub physical_cores: Option<usize>,
    /// Global utilisation over the sampling window, 0-100.
    pub percent: f32,
    /// Frequency of the first processor.
    pub frequency_mhz: u64,
}

/// Network interface with cumulative traffic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name.
    pub name: String,
    /// Hardware address.
    pub mac_address: String,
    /// Assigned addresses in CIDR notation.
    pub addresses: Vec<String>,
    /// Bytes received since boot.
    pub received: u64,
    /// Bytes transmitted since boot.
    pub transmitted: u64,
}

/// Host snapshot. Every part is collected in isolation; a part that could
/// not be collected is absent and explained in `errors`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSnapshot {
    /// Collection time.
    pub collected_at: DateTime<Utc>,
    /// OS identity.
    pub os: Option<OsInfo>,
    /// Memory usage.
    pub memory: Option<MemoryInfo>,
    /// Partitions reporting a capacity.
    pub disks: Vec<DiskInfo>,
    /// Processor information.
    pub cpu: Option<CpuInfo>,
    /// Interfaces sorted by name.
    pub network: Vec<NetworkInterface>,
    /// Number of running processes.
    pub processes: Option<usize>,
    /// Last boot.
    pub boot_time: Option<DateTime<Utc>>,
    /// Failed parts and the reason.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl SystemSnapshot {
    fn empty() -> Self {
        Self {
            collected_at: Utc::now(),
            os: None,
            memory: None,
            disks: Vec::new(),
            cpu: None,
            network: Vec::new(),
            processes: None,
            boot_time: None,
            errors: BTreeMap::new(),
        }
    }

    fn fail(&mut self, part: &str, reason: impl ToString) {
        let reason = reason.to_string();
        warn!(part, reason = %reason, "system probe part failed");
        self.errors.insert(part.to_string(), reason);
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (used as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

fn probe_os() -> OsInfo {
    OsInfo {
        name: System::name(),
        version: System::os_version(),
        long_version: System::long_os_version(),
        kernel: System::kernel_version(),
        hostname: System::host_name(),
        arch: std::env::consts::ARCH.to_string(),
    }
}

fn probe_memory() -> MemoryInfo {
    let mut sys = System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let available = sys.available_memory();
    MemoryInfo {
        total,
        available,
        used: sys.used_memory(),
        percent: percent(total.saturating_sub(available), total),
    }
}

fn probe_disks() -> Vec<DiskInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| disk.total_space() > 0)
        .map(|disk| {
            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            DiskInfo {
                device: disk.name().to_string_lossy().into_owned(),
                mountpoint: disk.mount_point().to_string_lossy().into_owned(),
                fstype: disk.file_system().to_string_lossy().into_owned(),
                total,
                used,
                free,
                percent: percent(used, total),
            }
        })
        .collect()
}

fn probe_network() -> Vec<NetworkInterface> {
    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<NetworkInterface> = networks
        .list()
        .iter()
        .map(|(name, data)| NetworkInterface {
            name: name.clone(),
            mac_address: data.mac_address().to_string(),
            addresses: data
                .ip_networks()
                .iter()
                .map(|network| format!("{}/{}", network.addr, network.prefix))
                .collect(),
            received: data.total_received(),
            transmitted: data.total_transmitted(),
        })
        .collect();
    interfaces.sort_by(|a, b| a.name.cmp(&b.name));
    interfaces
}

fn probe_processes() -> usize {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true)
}

fn probe_boot_time() -> Option<DateTime<Utc>> {
    let secs = i64::try_from(System::boot_time()).ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

async fn probe_cpu(sample: Duration) -> anyhow::Result<CpuInfo> {
    let mut sys = spawn_blocking(|| {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys
    })
    .await?;
    sleep(sample.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
    let info = spawn_blocking(move || {
        sys.refresh_cpu_all();
        CpuInfo {
            count: sys.cpus().len(),
            physical_cores: sys.physical_core_count(),
            percent: sys.global_cpu_usage(),
            frequency_mhz: sys.cpus().first().map_or(0, sysinfo::Cpu::frequency),
        }
    })
    .await?;
    Ok(info)
}

/// Collects a snapshot, sampling CPU utilisation over `cpu_sample`.
pub async fn collect_snapshot(cpu_sample: Duration) -> SystemSnapshot {
    let mut snapshot = SystemSnapshot::empty();

    let (os, memory, disks, network, processes, boot_time, cpu) = tokio::join!(
        spawn_blocking(probe_os),
        spawn_blocking(probe_memory),
        spawn_blocking(probe_disks),
        spawn_blocking(probe_network),
        spawn_blocking(probe_processes),
        spawn_blocking(probe_boot_time),
        probe_cpu(cpu_sample),
    );

    match os {
        Ok(os) => snapshot.os = Some(os),
        Err(err) => snapshot.fail("os", err),
    }
    match memory {
        Ok(memory) => snapshot.memory = Some(memory),
        Err(err) => snapshot.fail("memory", err),
    }
    match disks {
        Ok(disks) => snapshot.disks = disks,
        Err(err) => snapshot.fail("disks", err),
    }
    match network {
        Ok(network) => snapshot.network = network,
        Err(err) => snapshot.fail("network", err),
    }
    match processes {
        Ok(count) => snapshot.processes = Some(count),
        Err(err) => snapshot.fail("processes", err),
    }
    match boot_time {
        Ok(Some(boot)) => snapshot.boot_time = Some(boot),
        Ok(None) => snapshot.fail("boot_time", "boot time unavailable"),
        Err(err) => snapshot.fail("boot_time", err),
    }
    match cpu {
        Ok(cpu) => snapshot.cpu = Some(cpu),
        Err(err) => snapshot.fail("cpu", err),
    }

    debug!(
        disks = snapshot.disks.len(),
        interfaces = snapshot.network.len(),
        errors = snapshot.errors.len(),
        "system snapshot collected"
    );
    snapshot
}

/// In-process host snapshot; never spawns a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInfoExecutor;

#[async_trait]
impl ActionExecutor for SystemInfoExecutor {
    fn kinds(&self) -> &'static [ActionKind] {
        &[ActionKind::QueryInfo]
    }

    fn name(&self) -> &str {
        "system_info"
    }

    async fn execute(&self, _action: &ValidatedAction, ctx: &ExecutionContext) -> ExecutionResult {
        let snapshot = collect_snapshot(ctx.policy.cpu_sample).await;
        let output = serde_json::to_string_pretty(&snapshot).unwrap_or_default();
        ExecutionResult::completed(
            ctx.request_id,
            output,
            ResultDetail::SystemSnapshot(Box::new(snapshot)),
        )
    }
}
