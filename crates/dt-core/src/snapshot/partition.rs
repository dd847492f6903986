//! Partition-layout heuristics.
//!
//! Every layout feature is an ordered list of independent signals. The
//! first signal that fires proves the feature and is reported by name;
//! only when none fires is the feature absent.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::props::PropertyStore;
use crate::sysfs::NodeReader;

/// What a signal may look at.
pub struct SignalEnv<'a> {
    pub props: &'a dyn PropertyStore,
    pub fs: &'a dyn NodeReader,
    /// Kernel release, lower-cased.
    pub kernel: &'a str,
    pub api_level: Option<i64>,
}

impl<'a> SignalEnv<'a> {
    pub fn new(
        props: &'a dyn PropertyStore,
        fs: &'a dyn NodeReader,
        kernel: &'a str,
        api_level: Option<i64>,
    ) -> Self {
        Self {
            props,
            fs,
            kernel,
            api_level,
        }
    }

    fn prop_true(&self, key: &str) -> bool {
        self.props.get(key, "") == "true"
    }

    fn any_path(&self, paths: &[&str]) -> bool {
        paths.iter().any(|p| self.fs.exists(p))
    }
}

/// One named predicate.
#[derive(Clone, Copy)]
pub struct Signal {
    pub name: &'static str,
    pub check: fn(&SignalEnv<'_>) -> bool,
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal").field("name", &self.name).finish()
    }
}

/// Outcome of one feature check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub present: bool,
    /// Name of the signal that proved the feature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<&'static str>,
}

/// First-true-wins over `signals`.
pub fn detect(signals: &[Signal], env: &SignalEnv<'_>) -> Detection {
    signals
        .iter()
        .find(|s| (s.check)(env))
        .map(|s| Detection {
            present: true,
            signal: Some(s.name),
        })
        .unwrap_or_default()
}

const GSI_NAME_PROPS: &[&str] = &[
    "ro.product.system.name",
    "ro.product.system.device",
    "ro.build.flavor",
    "ro.product.name",
];

pub const GSI_SIGNALS: &[Signal] = &[
    Signal {
        name: "gsi_product_name",
        check: |env| {
            GSI_NAME_PROPS.iter().any(|key| {
                let v = env.props.get(key, "").to_lowercase();
                v.contains("gsi") || v.contains("treble_") || v.contains("aosp")
            })
        },
    },
    Signal {
        name: "phh_properties",
        check: |env| {
            env.props.get_opt("persist.sys.phh.mainkeys").is_some()
                || env.props.get_opt("ro.treble.phh.rom_hal_version").is_some()
        },
    },
    Signal {
        name: "phh_system_dir",
        check: |env| env.fs.exists("/system/phh"),
    },
    Signal {
        name: "phh_su_binary",
        check: |env| env.fs.exists("/system/bin/phh-su"),
    },
];

fn gki_release() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\.(\d+)\.\d+-android\d+-").expect("gki release pattern"))
}

/// `X.Y.Z-androidNN-` with X.Y at least 5.4.
pub fn is_gki_release(kernel: &str) -> bool {
    gki_release().captures(kernel).is_some_and(|c| {
        let major: u32 = c[1].parse().unwrap_or(0);
        let minor: u32 = c[2].parse().unwrap_or(0);
        major > 5 || (major == 5 && minor >= 4)
    })
}

pub const GKI_SIGNALS: &[Signal] = &[
    Signal {
        name: "kernel_tag",
        check: |env| env.kernel.contains("gki"),
    },
    Signal {
        name: "android_kernel_release",
        check: |env| is_gki_release(env.kernel),
    },
];

pub const DYNAMIC_PARTITION_SIGNALS: &[Signal] = &[
    Signal {
        name: "ro.boot.dynamic_partitions",
        check: |env| env.prop_true("ro.boot.dynamic_partitions"),
    },
    Signal {
        name: "device_mapper_nodes",
        check: |env| {
            env.any_path(&[
                "/dev/block/mapper/system",
                "/dev/block/mapper/system_a",
                "/dev/block/mapper/vendor",
                "/dev/block/mapper/vendor_a",
            ])
        },
    },
    Signal {
        name: "super_partition",
        check: |env| env.fs.exists("/dev/block/by-name/super"),
    },
];

pub const AB_SIGNALS: &[Signal] = &[
    Signal {
        name: "ro.build.ab_update",
        check: |env| env.prop_true("ro.build.ab_update"),
    },
    Signal {
        name: "boot_a",
        check: |env| env.fs.exists("/dev/block/by-name/boot_a"),
    },
    Signal {
        name: "system_a",
        check: |env| env.fs.exists("/dev/block/by-name/system_a"),
    },
    Signal {
        name: "mapper_system_a",
        check: |env| env.fs.exists("/dev/block/mapper/system_a"),
    },
];

/// Root mount backed by a real filesystem.
fn root_mount_is_block(env: &SignalEnv<'_>) -> bool {
    let Some(mounts) = env.fs.read("/proc/mounts") else {
        return false;
    };
    mounts.lines().any(|line| {
        let parts: Vec<&str> = line.split(' ').collect();
        parts.len() >= 3 && parts[1] == "/" && parts[2] != "rootfs" && parts[2] != "tmpfs"
    })
}

pub const SYSTEM_AS_ROOT_SIGNALS: &[Signal] = &[
    Signal {
        name: "ro.build.system_root_image",
        check: |env| env.prop_true("ro.build.system_root_image"),
    },
    Signal {
        name: "ro.boot.system_root_image",
        check: |env| env.prop_true("ro.boot.system_root_image"),
    },
    Signal {
        name: "api_level_29",
        check: |env| env.api_level.is_some_and(|api| api >= 29),
    },
    Signal {
        name: "root_mount",
        check: root_mount_is_block,
    },
];

pub const VIRTUAL_AB_SIGNALS: &[Signal] = &[
    Signal {
        name: "ro.virtual_ab.enabled",
        check: |env| env.prop_true("ro.virtual_ab.enabled"),
    },
    Signal {
        name: "snapshotctl",
        check: |env| env.fs.exists("/system/bin/snapshotctl"),
    },
];

pub const VIRTUAL_AB_COMPRESSION_SIGNALS: &[Signal] = &[
    Signal {
        name: "ro.virtual_ab.compression.enabled",
        check: |env| env.prop_true("ro.virtual_ab.compression.enabled"),
    },
    Signal {
        name: "snapuserd",
        check: |env| env.fs.exists("/system/bin/snapuserd"),
    },
];

/// Virtual A/B flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VirtualAb {
    NotSupported,
    Standard,
    Retrofit,
    Compressed,
    CompressedRetrofit,
}

impl VirtualAb {
    pub fn label(self) -> &'static str {
        match self {
            VirtualAb::NotSupported => dt_common::sentinel::NOT_SUPPORTED,
            VirtualAb::Standard => "VAB (Standard)",
            VirtualAb::Retrofit => "VAB (Retrofit)",
            VirtualAb::Compressed => "VABC (Compressed)",
            VirtualAb::CompressedRetrofit => "VABC (Compressed Retrofit)",
        }
    }
}

impl std::fmt::Display for VirtualAb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// All layout features of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionLayout {
    pub treble: bool,
    pub seamless_update: Detection,
    pub dynamic_partitions: Detection,
    pub retrofit_dynamic_partitions: bool,
    pub virtual_ab: Detection,
    pub virtual_ab_status: VirtualAb,
    pub system_as_root: Detection,
    pub gsi: Detection,
    pub gki: Detection,
}

impl PartitionLayout {
    pub fn detect(env: &SignalEnv<'_>) -> Self {
        let virtual_ab = detect(VIRTUAL_AB_SIGNALS, env);
        let virtual_ab_status = if virtual_ab.present {
            let compressed = detect(VIRTUAL_AB_COMPRESSION_SIGNALS, env).present;
            let retrofit = env.prop_true("ro.virtual_ab.retrofit");
            match (compressed, retrofit) {
                (true, true) => VirtualAb::CompressedRetrofit,
                (true, false) => VirtualAb::Compressed,
                (false, true) => VirtualAb::Retrofit,
                (false, false) => VirtualAb::Standard,
            }
        } else {
            VirtualAb::NotSupported
        };

        Self {
            treble: env.prop_true("ro.treble.enabled"),
            seamless_update: detect(AB_SIGNALS, env),
            dynamic_partitions: detect(DYNAMIC_PARTITION_SIGNALS, env),
            retrofit_dynamic_partitions: env.prop_true("ro.boot.dynamic_partitions_retrofit"),
            virtual_ab,
            virtual_ab_status,
            system_as_root: detect(SYSTEM_AS_ROOT_SIGNALS, env),
            gsi: detect(GSI_SIGNALS, env),
            gki: detect(GKI_SIGNALS, env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::MapPropertyStore;
    use crate::test_utils::MemoryFs;

    /// Every subset of `n` signals: present iff any fires, and the
    /// reported signal is the lowest-indexed one that fired.
    fn exhaustive(
        signals: &[Signal],
        setup: impl Fn(usize, &mut MapPropertyStore, &mut MemoryFs, &mut String, &mut Option<i64>),
    ) {
        let n = signals.len();
        for mask in 0u32..(1 << n) {
            let mut props = MapPropertyStore::new();
            let mut fs = MemoryFs::new();
            let mut kernel = String::from("4.14.190-perf");
            let mut api = Some(28);
            for bit in 0..n {
                if mask & (1 << bit) != 0 {
                    setup(bit, &mut props, &mut fs, &mut kernel, &mut api);
                }
            }
            let env = SignalEnv::new(&props, &fs, &kernel, api);
            let got = detect(signals, &env);
            assert_eq!(got.present, mask != 0, "mask {mask:0width$b}", width = n);
            let expected = (0..n).find(|b| mask & (1 << b) != 0).map(|b| signals[b].name);
            assert_eq!(got.signal, expected, "mask {mask:0width$b}", width = n);
        }
    }

    #[test]
    fn gsi_every_combination() {
        exhaustive(GSI_SIGNALS, |bit, props, fs, _, _| match bit {
            0 => props.insert("ro.product.system.name", "treble_arm64_bvN"),
            1 => props.insert("ro.treble.phh.rom_hal_version", "12"),
            2 => fs.insert("/system/phh/empty", ""),
            _ => fs.insert("/system/bin/phh-su", ""),
        });
    }

    #[test]
    fn gki_every_combination() {
        exhaustive(GKI_SIGNALS, |bit, _, _, kernel, _| match bit {
            0 => kernel.push_str("-gki"),
            _ => *kernel = format!("5.10.168-android12-9{}", kernel.contains("gki").then_some("-gki").unwrap_or("")),
        });
    }

    #[test]
    fn dynamic_partitions_every_combination() {
        exhaustive(DYNAMIC_PARTITION_SIGNALS, |bit, props, fs, _, _| match bit {
            0 => props.insert("ro.boot.dynamic_partitions", "true"),
            1 => fs.insert("/dev/block/mapper/vendor_a", ""),
            _ => fs.insert("/dev/block/by-name/super", ""),
        });
    }

    #[test]
    fn seamless_update_every_combination() {
        exhaustive(AB_SIGNALS, |bit, props, fs, _, _| match bit {
            0 => props.insert("ro.build.ab_update", "true"),
            1 => fs.insert("/dev/block/by-name/boot_a", ""),
            2 => fs.insert("/dev/block/by-name/system_a", ""),
            _ => fs.insert("/dev/block/mapper/system_a", ""),
        });
    }

    #[test]
    fn system_as_root_every_combination() {
        exhaustive(SYSTEM_AS_ROOT_SIGNALS, |bit, props, fs, _, api| match bit {
            0 => props.insert("ro.build.system_root_image", "true"),
            1 => props.insert("ro.boot.system_root_image", "true"),
            2 => *api = Some(30),
            _ => fs.insert("/proc/mounts", "/dev/root / ext4 ro,seclabel 0 0\n"),
        });
    }

    #[test]
    fn gki_release_boundary() {
        assert!(is_gki_release("5.4.210-android11-2-g1234"));
        assert!(is_gki_release("6.1.25-android14-11-abc"));
        assert!(!is_gki_release("5.3.0-android11-x"));
        assert!(!is_gki_release("4.19.157-perf+"));
    }

    #[test]
    fn tmpfs_root_is_not_system_as_root() {
        let props = MapPropertyStore::new();
        let fs = MemoryFs::new().with_file("/proc/mounts", "tmpfs / tmpfs rw 0 0\n");
        let env = SignalEnv::new(&props, &fs, "", Some(28));
        assert!(!detect(SYSTEM_AS_ROOT_SIGNALS, &env).present);
    }

    #[test]
    fn virtual_ab_status_variants() {
        let fs = MemoryFs::new();
        let status = |props: MapPropertyStore, fs: &MemoryFs| {
            PartitionLayout::detect(&SignalEnv::new(&props, fs, "", None)).virtual_ab_status
        };

        assert_eq!(status(MapPropertyStore::new(), &fs), VirtualAb::NotSupported);
        assert_eq!(
            status(MapPropertyStore::new().with("ro.virtual_ab.enabled", "true"), &fs),
            VirtualAb::Standard
        );
        assert_eq!(
            status(
                MapPropertyStore::new()
                    .with("ro.virtual_ab.enabled", "true")
                    .with("ro.virtual_ab.retrofit", "true"),
                &fs
            ),
            VirtualAb::Retrofit
        );

        let snap_fs = MemoryFs::new()
            .with_file("/system/bin/snapshotctl", "")
            .with_file("/system/bin/snapuserd", "");
        assert_eq!(status(MapPropertyStore::new(), &snap_fs), VirtualAb::Compressed);
        assert_eq!(
            status(MapPropertyStore::new().with("ro.virtual_ab.retrofit", "true"), &snap_fs),
            VirtualAb::CompressedRetrofit
        );
        assert_eq!(VirtualAb::CompressedRetrofit.label(), "VABC (Compressed Retrofit)");
    }
}
