use crate::model::CommandParams;
use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, Volume, VolumeMount};

pub const SHM_VOLUME_NAME: &str = "dshm";
pub const SHM_MOUNT_PATH: &str = "/dev/shm";
pub const ADAPTER_VOLUME_NAME: &str = "adapter-volume";
pub const ADAPTER_MOUNT_PATH: &str = "/mnt/adapter";

/// Appends every parameter to `base` as ` --key=value`, or ` --key` when the value is empty.
pub fn build_cmd_str(base: &str, params: Option<&CommandParams>) -> String {
    let mut cmd = base.to_string();
    for (key, value) in params.into_iter().flat_map(|p| p.iter()) {
        if value.is_empty() {
            cmd.push_str(&format!(" --{key}"));
        } else {
            cmd.push_str(&format!(" --{key}={value}"));
        }
    }
    cmd
}

/// Wraps a command line so it is evaluated by a shell inside the container.
pub fn shell_cmd(command: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()]
}

/// In-memory `/dev/shm` used by workers of a multi-node workload to exchange tensors.
/// Single-node workloads don't get one.
pub fn config_shm_volume(node_count: i32) -> Option<(Volume, VolumeMount)> {
    if node_count <= 1 {
        return None;
    }
    let volume = Volume {
        name: SHM_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource {
            medium: Some("Memory".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: SHM_VOLUME_NAME.to_string(),
        mount_path: SHM_MOUNT_PATH.to_string(),
        ..Default::default()
    };
    Some((volume, mount))
}

/// Scratch volume the adapters are copied into before the model server starts.
pub fn config_adapter_volume() -> (Volume, VolumeMount) {
    let volume = Volume {
        name: ADAPTER_VOLUME_NAME.to_string(),
        empty_dir: Some(EmptyDirVolumeSource::default()),
        ..Default::default()
    };
    let mount = VolumeMount {
        name: ADAPTER_VOLUME_NAME.to_string(),
        mount_path: ADAPTER_MOUNT_PATH.to_string(),
        ..Default::default()
    };
    (volume, mount)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_cmd_str_appends_params_in_order() {
        let params = CommandParams::from([("nnodes", "2"), ("standalone", ""), ("a", "b")]);

        assert_eq!(
            build_cmd_str("torchrun", Some(&params)),
            "torchrun --nnodes=2 --standalone --a=b"
        );
        assert_eq!(build_cmd_str("torchrun", None), "torchrun");
        assert_eq!(
            build_cmd_str("torchrun", Some(&CommandParams::new())),
            "torchrun"
        );
    }

    #[test]
    fn shell_cmd_wraps_command() {
        assert_eq!(shell_cmd("echo hi"), vec!["/bin/sh", "-c", "echo hi"]);
    }

    #[test]
    fn shm_volume_only_for_multi_node() {
        assert!(config_shm_volume(0).is_none());
        assert!(config_shm_volume(1).is_none());

        let (volume, mount) = config_shm_volume(2).unwrap();
        assert_eq!(volume.name, SHM_VOLUME_NAME);
        assert_eq!(
            volume.empty_dir.unwrap().medium,
            Some("Memory".to_string())
        );
        assert_eq!(mount.mount_path, SHM_MOUNT_PATH);
    }

    #[test]
    fn adapter_volume() {
        let (volume, mount) = config_adapter_volume();
        assert_eq!(volume.name, mount.name);
        assert_eq!(mount.mount_path, ADAPTER_MOUNT_PATH);
    }
}
