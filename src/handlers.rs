//! Command Handlers
//!
//! The management commands exposed over chat. Each handler delegates real
//! work to the external shell scripts through the shell bridge and formats
//! the captured output; none of them parse shell metacharacters, and every
//! chat-supplied value travels as a single argv element.

use crate::admins::{AuthorizationStore, Permission, PermissionSet};
use crate::audit::AuditLog;
use crate::qr::QrProducer;
use crate::router::{
    CommandDescriptor, CommandHandler, CommandRouter, HandlerError, Invocation, Reply,
};
use crate::shell::{script_argv, ShellBridge};
use crate::userdb;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Shared context for all handlers.
pub struct HandlerCtx {
    pub shell: ShellBridge,
    pub scripts_dir: PathBuf,
    pub users_file: PathBuf,
    pub admins: Arc<AuthorizationStore>,
    pub audit: Arc<AuditLog>,
    pub qr: Arc<dyn QrProducer>,
}

impl HandlerCtx {
    /// Run a management script subcommand, mapping non-zero exit to a
    /// handler failure carrying the script's stderr.
    async fn script(
        &self,
        script: &str,
        subcommand: &str,
        args: &[String],
    ) -> Result<String, HandlerError> {
        let argv = script_argv(&self.scripts_dir, script, subcommand, args);
        let output = self.shell.run(&argv).await?;
        if output.success() {
            Ok(output.stdout)
        } else {
            Err(HandlerError::Failed(format!(
                "{} {} exited {}: {}",
                script, subcommand, output.exit_code, output.stderr
            )))
        }
    }
}

fn require_arg<'a>(invocation: &'a Invocation, index: usize, name: &str) -> Result<&'a String, HandlerError> {
    invocation
        .args
        .get(index)
        .ok_or_else(|| HandlerError::Failed(format!("missing argument: {}", name)))
}

// ---------------------------------------------------------------------------
// System commands

struct StatusHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for StatusHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let mut lines = Vec::new();

        let service = self
            .0
            .shell
            .run(&argv(&["systemctl", "is-active", "vless-vpn"]))
            .await;
        let service_up = matches!(&service, Ok(o) if o.success() && o.stdout == "active");
        lines.push(format!(
            "VLESS Service: {}",
            if service_up { "🟢 Running" } else { "🔴 Stopped" }
        ));

        if let Ok(out) = self
            .0
            .shell
            .run(&argv(&[
                "docker", "ps", "--filter", "name=vless", "--format", "{{.Names}}",
            ]))
            .await
        {
            let count = if out.stdout.is_empty() {
                0
            } else {
                out.stdout.lines().count()
            };
            lines.push(format!("Docker Containers: {} running", count));
        }

        if let Ok(out) = self.0.shell.run(&argv(&["df", "-h", "/opt/vless"])).await {
            if let Some(usage) = out.stdout.lines().nth(1).and_then(|l| l.split_whitespace().nth(4)) {
                lines.push(format!("Disk Usage: {}", usage));
            }
        }

        if let Ok(out) = self.0.shell.run(&argv(&["free", "-h"])).await {
            if let Some(used) = out.stdout.lines().nth(1).and_then(|l| l.split_whitespace().nth(2)) {
                lines.push(format!("Memory Usage: {}", used));
            }
        }

        let ping = self
            .0
            .shell
            .run(&argv(&["ping", "-c", "1", "8.8.8.8"]))
            .await;
        let online = matches!(&ping, Ok(o) if o.success());
        lines.push(format!(
            "Network: {}",
            if online { "🟢 Connected" } else { "🔴 Disconnected" }
        ));

        Ok(Reply::Text(format!(
            "📊 VLESS Server Status\n\n{}",
            lines.join("\n")
        )))
    }
}

struct MonitorHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for MonitorHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let report = self.0.script("monitoring.sh", "health-check", &[]).await?;
        Ok(Reply::Text(format!("📊 System Monitoring\n\n{}", report)))
    }
}

struct LogsHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for LogsHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let log_type = invocation
            .args
            .first()
            .map(String::as_str)
            .unwrap_or("main");
        let log_file = match log_type {
            "error" => "/opt/vless/logs/error.log",
            "security" => "/opt/vless/logs/security.log",
            "access" => "/opt/vless/logs/access.log",
            _ => "/opt/vless/logs/vless-vpn.log",
        };

        let output = self
            .0
            .shell
            .run(&argv(&["tail", "-20", log_file]))
            .await?;
        if !output.success() {
            return Err(HandlerError::Failed(output.stderr));
        }
        Ok(Reply::Text(format!(
            "📋 Recent {} logs\n\n{}",
            log_type, output.stdout
        )))
    }
}

struct RestartHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for RestartHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        info!("Service restart requested by {}", invocation.actor_id);
        let output = self
            .0
            .shell
            .run(&argv(&["systemctl", "restart", "vless-vpn"]))
            .await?;
        if !output.success() {
            return Err(HandlerError::Failed(output.stderr));
        }
        Ok(Reply::Text("✅ VLESS service restarted.".to_string()))
    }
}

// ---------------------------------------------------------------------------
// VPN user commands

struct UsersHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for UsersHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let listing = self.0.script("user_management.sh", "list", &[]).await?;

        // The JSON document gives an active/total summary the script lacks
        let summary = match userdb::load_users(&self.0.users_file) {
            Ok(users) => {
                let active = users.iter().filter(|u| u.is_active()).count();
                format!("{} users ({} active)", users.len(), active)
            }
            Err(_) => String::new(),
        };

        Ok(Reply::Text(format!("👥 VLESS Users {}\n\n{}", summary, listing)))
    }
}

struct AddUserHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for AddUserHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let username = require_arg(invocation, 0, "username")?;
        let output = self
            .0
            .script("user_management.sh", "add", std::slice::from_ref(username))
            .await?;
        Ok(Reply::Text(format!("✅ User added.\n\n{}", output)))
    }
}

struct RemoveUserHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for RemoveUserHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let username = require_arg(invocation, 0, "username")?;
        let output = self
            .0
            .script(
                "user_management.sh",
                "remove",
                std::slice::from_ref(username),
            )
            .await?;
        Ok(Reply::Text(format!("✅ User removed.\n\n{}", output)))
    }
}

struct ConfigHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for ConfigHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let username = require_arg(invocation, 0, "username")?;
        let connection_string = self
            .0
            .script("user_management.sh", "show", std::slice::from_ref(username))
            .await?;

        let caption = format!("🔗 Configuration for {}\n\n{}", username, connection_string);

        // QR rendering is best-effort; the connection string alone is usable
        match self.0.qr.render(&connection_string).await {
            Ok(bytes) => Ok(Reply::Photo { bytes, caption }),
            Err(e) => {
                info!("QR rendering unavailable ({}), sending text only", e);
                Ok(Reply::Text(caption))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backup commands

struct BackupListHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for BackupListHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let listing = self.0.script("backup_restore.sh", "list", &[]).await?;
        Ok(Reply::Text(format!("💾 Backups\n\n{}", listing)))
    }
}

struct BackupCreateHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for BackupCreateHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let output = self.0.script("backup_restore.sh", "create", &[]).await?;
        Ok(Reply::Text(format!("✅ Backup created.\n\n{}", output)))
    }
}

// ---------------------------------------------------------------------------
// Admin management + audit review

struct GrantHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for GrantHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let actor_id: i64 = require_arg(invocation, 0, "actor_id")?
            .parse()
            .map_err(|_| HandlerError::Failed("actor_id must be numeric".to_string()))?;
        let name = require_arg(invocation, 1, "name")?;

        self.0
            .admins
            .add_admin(actor_id, name, PermissionSet::All, invocation.actor_id)
            .map_err(|e| HandlerError::Failed(e.to_string()))?;
        Ok(Reply::Text(format!("✅ {} ({}) is now an admin.", name, actor_id)))
    }
}

struct RevokeHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for RevokeHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let actor_id: i64 = require_arg(invocation, 0, "actor_id")?
            .parse()
            .map_err(|_| HandlerError::Failed("actor_id must be numeric".to_string()))?;

        self.0
            .admins
            .revoke_admin(actor_id)
            .map_err(|e| HandlerError::Failed(e.to_string()))?;
        Ok(Reply::Text(format!("✅ Admin {} revoked.", actor_id)))
    }
}

struct AdminListHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for AdminListHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        let records = self
            .0
            .admins
            .list()
            .map_err(|e| HandlerError::Failed(e.to_string()))?;

        let mut lines = vec!["🔑 Administrators".to_string(), String::new()];
        for record in records {
            let marker = if record.active { "🟢" } else { "⚫" };
            lines.push(format!("{} {} ({})", marker, record.display_name, record.actor_id));
        }
        Ok(Reply::Text(lines.join("\n")))
    }
}

struct AuditViewHandler(Arc<HandlerCtx>);

#[async_trait]
impl CommandHandler for AuditViewHandler {
    async fn handle(&self, invocation: &Invocation) -> Result<Reply, HandlerError> {
        let n: usize = invocation
            .args
            .first()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        let entries = self
            .0
            .audit
            .recent(n.min(100))
            .map_err(|e| HandlerError::Failed(e.to_string()))?;

        let mut lines = vec![format!("🧾 Last {} audit entries", entries.len()), String::new()];
        for entry in entries {
            let when = Utc
                .timestamp_opt(entry.timestamp, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| entry.timestamp.to_string());
            lines.push(format!(
                "{} | {} ({}) | {} | {}",
                when,
                entry.actor_name,
                entry.actor_id,
                entry.action,
                entry.outcome.as_str()
            ));
        }
        Ok(Reply::Text(lines.join("\n")))
    }
}

struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    async fn handle(&self, _invocation: &Invocation) -> Result<Reply, HandlerError> {
        Ok(Reply::Text(
            "🔒 VLESS Management Bot\n\n\
             System:\n\
             /status — server status\n\
             /monitor — health check\n\
             /logs [main|error|security|access] — recent logs\n\
             /restart — restart the VPN service (confirmed)\n\n\
             Users:\n\
             /users — list VPN users\n\
             /adduser <name> — create a VPN user\n\
             /removeuser <name> — delete a VPN user (confirmed)\n\
             /config <name> — connection string + QR code\n\n\
             Backups:\n\
             /backup — list backups\n\
             /backupnow — create a backup (confirmed)\n\n\
             Admins:\n\
             /admins — list bot admins\n\
             /grant <id> <name> — add a bot admin\n\
             /revoke <id> — revoke a bot admin (confirmed)\n\
             /audit [n] — recent audit entries"
                .to_string(),
        ))
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Build the full command table. The router owns the descriptors from here
/// on; registration happens once, at startup.
pub fn register_all(router: &mut CommandRouter, ctx: Arc<HandlerCtx>) {
    use Permission::*;

    let table: Vec<CommandDescriptor> = vec![
        CommandDescriptor {
            name: "start",
            required_permission: None,
            destructive: false,
            handler: Arc::new(HelpHandler),
        },
        CommandDescriptor {
            name: "help",
            required_permission: None,
            destructive: false,
            handler: Arc::new(HelpHandler),
        },
        CommandDescriptor {
            name: "status",
            required_permission: None,
            destructive: false,
            handler: Arc::new(StatusHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "monitor",
            required_permission: Some(Monitoring),
            destructive: false,
            handler: Arc::new(MonitorHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "logs",
            required_permission: Some(LogAccess),
            destructive: false,
            handler: Arc::new(LogsHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "restart",
            required_permission: Some(Maintenance),
            destructive: true,
            handler: Arc::new(RestartHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "users",
            required_permission: Some(UserManagement),
            destructive: false,
            handler: Arc::new(UsersHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "adduser",
            required_permission: Some(UserManagement),
            destructive: false,
            handler: Arc::new(AddUserHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "removeuser",
            required_permission: Some(UserManagement),
            destructive: true,
            handler: Arc::new(RemoveUserHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "config",
            required_permission: Some(ConfigGeneration),
            destructive: false,
            handler: Arc::new(ConfigHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "backup",
            required_permission: Some(BackupManagement),
            destructive: false,
            handler: Arc::new(BackupListHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "backupnow",
            required_permission: Some(BackupManagement),
            destructive: true,
            handler: Arc::new(BackupCreateHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "admins",
            required_permission: Some(AdminManagement),
            destructive: false,
            handler: Arc::new(AdminListHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "grant",
            required_permission: Some(AdminManagement),
            destructive: false,
            handler: Arc::new(GrantHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "revoke",
            required_permission: Some(AdminManagement),
            destructive: true,
            handler: Arc::new(RevokeHandler(ctx.clone())),
        },
        CommandDescriptor {
            name: "audit",
            required_permission: Some(AdminManagement),
            destructive: false,
            handler: Arc::new(AuditViewHandler(ctx)),
        },
    ];

    for descriptor in table {
        router.register(descriptor);
    }
}
