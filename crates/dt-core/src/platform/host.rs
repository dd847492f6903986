//! Platform facts from the running system.
//!
//! Reads procfs/sysfs through the same [`NodeReader`] the probes use, so a
//! re-rooted capture answers consistently. Interface addresses and
//! `uname` are only consulted on a live (un-rooted) tree.

use std::ffi::{CStr, CString};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::trace;

use super::{
    BatteryReading, CameraInfo, ChargeSource, ChargeState, DataNetwork, DisplayInfo, FeatureSet,
    InterfaceAddrs, MemoryInfo, NetworkInfo, PlatformSource, StorageInfo,
};
use crate::props::PropertyStore;
use crate::sysfs::{HostFs, NodeReader};

const BATTERY_DIR: &str = "/sys/class/power_supply/battery";

const PERMISSION_DIRS: &[&str] = &[
    "/system/etc/permissions",
    "/vendor/etc/permissions",
    "/product/etc/permissions",
    "/odm/etc/permissions",
];

/// Platform facts from procfs, sysfs, permission files and properties.
pub struct HostPlatform {
    fs: HostFs,
    props: Arc<dyn PropertyStore>,
}

impl HostPlatform {
    pub fn new(fs: HostFs, props: Arc<dyn PropertyStore>) -> Self {
        Self { fs, props }
    }

    fn is_live(&self) -> bool {
        self.fs.root().is_none()
    }

    fn battery_node(&self, name: &str) -> Option<String> {
        self.fs.read_trimmed(&format!("{BATTERY_DIR}/{name}"))
    }

    fn supply_online(&self, supply: &str) -> bool {
        self.fs
            .read_trimmed(&format!("/sys/class/power_supply/{supply}/online"))
            .is_some_and(|v| v == "1")
    }
}

impl PlatformSource for HostPlatform {
    fn memory(&self) -> Option<MemoryInfo> {
        parse_meminfo(&self.fs.read("/proc/meminfo")?)
    }

    fn storage(&self) -> Option<StorageInfo> {
        let target = if self.fs.exists("/data") { "/data" } else { "/" };
        statvfs(&self.fs.resolve(target))
    }

    fn battery(&self) -> Option<BatteryReading> {
        if !self.fs.exists(BATTERY_DIR) {
            return None;
        }
        let int = |name: &str| self.battery_node(name).and_then(|v| v.parse::<i64>().ok());

        let source = if self.supply_online("ac") {
            ChargeSource::Ac
        } else if self.supply_online("usb") {
            ChargeSource::Usb
        } else if self.supply_online("wireless") {
            ChargeSource::Wireless
        } else {
            ChargeSource::Battery
        };

        Some(BatteryReading {
            level_percent: int("capacity"),
            state: self
                .battery_node("status")
                .map(|s| ChargeState::from_sysfs(&s))
                .unwrap_or_default(),
            health: self.battery_node("health").map(|h| h.to_ascii_lowercase()),
            technology: self.battery_node("technology"),
            temperature_tenths: int("temp"),
            // voltage_now is in microvolts
            voltage_mv: int("voltage_now").map(|uv| uv / 1000),
            current_ua: None,
            source,
            cycle_count: None,
            charge_time_remaining_ms: None,
        })
    }

    fn network(&self) -> NetworkInfo {
        let operator = self
            .props
            .get_opt("gsm.operator.alpha")
            .and_then(|v| first_list_item(&v));
        let data_network = self
            .props
            .get_opt("gsm.network.type")
            .and_then(|v| first_list_item(&v))
            .map(|v| DataNetwork::from_name(&v));
        let active_interface = self
            .fs
            .read("/proc/net/route")
            .and_then(|r| default_route_interface(&r));
        let interfaces = if self.is_live() {
            interface_addrs()
        } else {
            Vec::new()
        };

        NetworkInfo {
            operator,
            data_network,
            active_interface,
            interfaces,
            wifi_link_speed_mbps: None,
            wifi_standard: None,
        }
    }

    fn display(&self) -> DisplayInfo {
        let (width_px, height_px) = self
            .fs
            .read_trimmed("/sys/class/graphics/fb0/virtual_size")
            .and_then(|s| parse_virtual_size(&s))
            .map_or((None, None), |(w, h)| (Some(w), Some(h)));
        DisplayInfo {
            width_px,
            height_px,
            density_dpi: self
                .props
                .get_int("ro.sf.lcd_density")
                .and_then(|d| u32::try_from(d).ok()),
            ..DisplayInfo::default()
        }
    }

    fn camera(&self) -> CameraInfo {
        CameraInfo::default()
    }

    fn features(&self) -> FeatureSet {
        let mut set = FeatureSet::default();
        for dir in PERMISSION_DIRS {
            for name in self.fs.list_dir(dir) {
                if !name.ends_with(".xml") {
                    continue;
                }
                if let Some(xml) = self.fs.read(&format!("{dir}/{name}")) {
                    collect_features(&xml, &mut set);
                }
            }
        }
        set.active_sim_count = self
            .props
            .get_opt("gsm.sim.state")
            .map(|v| count_ready_sims(&v));
        trace!(features = set.names.len(), "features collected");
        set
    }

    fn thermal_status(&self) -> Option<i64> {
        None
    }

    fn uptime_ms(&self) -> Option<u64> {
        let content = self.fs.read("/proc/uptime")?;
        let secs: f64 = content.split_whitespace().next()?.parse().ok()?;
        Some((secs * 1000.0) as u64)
    }

    fn kernel_release(&self) -> Option<String> {
        if self.is_live() {
            uname_release()
        } else {
            None
        }
    }

    fn timezone(&self) -> Option<String> {
        self.props
            .get_opt("persist.sys.timezone")
            .or_else(|| std::env::var("TZ").ok().filter(|s| !s.is_empty()))
    }

    fn language(&self) -> Option<String> {
        self.props
            .get_opt("persist.sys.locale")
            .or_else(|| self.props.get_opt("ro.product.locale"))
    }
}

fn first_list_item(value: &str) -> Option<String> {
    value
        .split(',')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn count_ready_sims(value: &str) -> u32 {
    value
        .split(',')
        .filter(|s| matches!(s.trim(), "READY" | "LOADED"))
        .count() as u32
}

/// `MemTotal` and `MemAvailable` from `/proc/meminfo`.
pub(crate) fn parse_meminfo(content: &str) -> Option<MemoryInfo> {
    let mut total = None;
    let mut available = None;
    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let key = parts.next();
        let kb = parts.next().and_then(|v| v.parse::<u64>().ok());
        match key {
            Some("MemTotal:") => total = kb,
            Some("MemAvailable:") => available = kb,
            _ => {}
        }
    }
    Some(MemoryInfo {
        total_bytes: total? * 1024,
        available_bytes: available? * 1024,
    })
}

/// Interface of the IPv4 default route.
pub(crate) fn default_route_interface(route: &str) -> Option<String> {
    route.lines().skip(1).find_map(|line| {
        let mut cols = line.split_whitespace();
        let iface = cols.next()?;
        (cols.next()? == "00000000").then(|| iface.to_string())
    })
}

fn parse_virtual_size(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once(',')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn feature_tag() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<feature\b([^>]*)>").expect("feature tag pattern"))
}

fn feature_attr(name: &'static str) -> Regex {
    Regex::new(&format!(r#"\b{name}\s*=\s*"([^"]*)""#)).expect("attribute pattern")
}

/// Add every `<feature name=…>` of a permissions file.
pub(crate) fn collect_features(xml: &str, set: &mut FeatureSet) {
    static NAME: OnceLock<Regex> = OnceLock::new();
    static VERSION: OnceLock<Regex> = OnceLock::new();
    let name_re = NAME.get_or_init(|| feature_attr("name"));
    let version_re = VERSION.get_or_init(|| feature_attr("version"));

    for tag in feature_tag().captures_iter(xml) {
        let attrs = &tag[1];
        let Some(name) = name_re.captures(attrs).map(|c| c[1].to_string()) else {
            continue;
        };
        if name == super::feature::VULKAN_VERSION {
            set.vulkan_version = version_re
                .captures(attrs)
                .and_then(|c| c[1].parse::<i64>().ok())
                .and_then(|v| u32::try_from(v).ok());
        }
        set.names.insert(name);
    }
}

fn statvfs(path: &std::path::Path) -> Option<StorageInfo> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return None;
    }
    let frsize = stat.f_frsize as u64;
    Some(StorageInfo {
        total_bytes: stat.f_blocks as u64 * frsize,
        free_bytes: stat.f_bavail as u64 * frsize,
    })
}

fn uname_release() -> Option<String> {
    let mut uname = std::mem::MaybeUninit::<libc::utsname>::uninit();
    let result = unsafe { libc::uname(uname.as_mut_ptr()) };
    if result != 0 {
        return None;
    }
    let uname = unsafe { uname.assume_init() };
    let release = unsafe { CStr::from_ptr(uname.release.as_ptr()) }
        .to_string_lossy()
        .to_string();
    Some(release)
}

/// Addresses of every interface, in kernel order.
fn interface_addrs() -> Vec<InterfaceAddrs> {
    let mut head: *mut libc::ifaddrs = std::ptr::null_mut();
    if unsafe { libc::getifaddrs(&mut head) } != 0 {
        return Vec::new();
    }

    let mut out: Vec<InterfaceAddrs> = Vec::new();
    let mut cursor = head;
    while !cursor.is_null() {
        let ifa = unsafe { &*cursor };
        cursor = ifa.ifa_next;
        if ifa.ifa_addr.is_null() || ifa.ifa_name.is_null() {
            continue;
        }

        let family = i32::from(unsafe { (*ifa.ifa_addr).sa_family });
        let addr = match family {
            libc::AF_INET => {
                let sin = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in) };
                IpAddr::V4(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)))
            }
            libc::AF_INET6 => {
                let sin6 = unsafe { &*(ifa.ifa_addr as *const libc::sockaddr_in6) };
                IpAddr::V6(Ipv6Addr::from(sin6.sin6_addr.s6_addr))
            }
            _ => continue,
        };

        let name = unsafe { CStr::from_ptr(ifa.ifa_name) }
            .to_string_lossy()
            .into_owned();
        match out.iter_mut().find(|i| i.name == name) {
            Some(entry) => entry.addrs.push(addr),
            None => out.push(InterfaceAddrs {
                name,
                addrs: vec![addr],
            }),
        }
    }

    unsafe { libc::freeifaddrs(head) };
    out
}
