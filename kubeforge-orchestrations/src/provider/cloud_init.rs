//! First-boot script passed to every VM

use tera::{Context as TeraContext, Tera};

use crate::error::{Error, Result};

const CLOUD_INIT_TEMPLATE: &str = r#"#!/bin/bash
set -e

hostnamectl set-hostname {{ hostname }}
echo "127.0.1.1 {{ hostname }}" >> /etc/hosts

# kubelet refuses to start with swap enabled
swapoff -a
sed -i '/ swap / s/^/#/' /etc/fstab

{% if ssh_user != "root" -%}
mkdir -p /home/{{ ssh_user }}/.ssh
cp /root/.ssh/authorized_keys /home/{{ ssh_user }}/.ssh/authorized_keys
chown -R {{ ssh_user }}:{{ ssh_user }} /home/{{ ssh_user }}/.ssh
{% endif -%}
"#;

/// Render the first-boot script for a VM
pub fn render(hostname: &str, ssh_user: &str) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template("cloud-init", CLOUD_INIT_TEMPLATE)
        .map_err(|e| Error::Internal(format!("invalid cloud-init template: {}", e)))?;

    let mut ctx = TeraContext::new();
    ctx.insert("hostname", hostname);
    ctx.insert("ssh_user", ssh_user);

    tera.render("cloud-init", &ctx)
        .map_err(|e| Error::Internal(format!("failed to render cloud-init for {}: {}", hostname, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_sets_hostname() {
        let script = render("demo-vm-cp-0", "root").unwrap();
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("hostnamectl set-hostname demo-vm-cp-0"));
        assert!(!script.contains("authorized_keys"));
    }

    #[test]
    fn test_render_non_root_user() {
        let script = render("demo-vm-wp-1", "ubuntu").unwrap();
        assert!(script.contains("/home/ubuntu/.ssh"));
    }
}
