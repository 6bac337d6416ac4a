// ==========================================
// 出入库批量指令 - 权限校验
// ==========================================
// 角色:
// - Admin: 可提交全部类型，可审批/拒绝
// - Staff: 可提交入库/出库
// - Viewer: 只读（默认角色）
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::domain::types::{ActorRole, MovementKind};
use std::collections::HashMap;

/// 角色目录
pub trait RoleDirectory: Send + Sync {
    fn role_of(&self, actor_id: &str) -> ActorRole;
}

/// 静态角色表（由配置加载）
#[derive(Debug, Clone, Default)]
pub struct StaticRoleDirectory {
    roles: HashMap<String, ActorRole>,
}

impl StaticRoleDirectory {
    pub fn new(roles: HashMap<String, ActorRole>) -> Self {
        Self { roles }
    }

    pub fn with_role(mut self, actor_id: &str, role: ActorRole) -> Self {
        self.roles.insert(actor_id.to_string(), role);
        self
    }
}

impl RoleDirectory for StaticRoleDirectory {
    fn role_of(&self, actor_id: &str) -> ActorRole {
        self.roles.get(actor_id).copied().unwrap_or(ActorRole::Viewer)
    }
}

/// 校验提交权限
pub fn ensure_can_submit(
    roles: &dyn RoleDirectory,
    actor_id: &str,
    kind: MovementKind,
) -> ApiResult<ActorRole> {
    let role = roles.role_of(actor_id);
    if role.can_submit(kind) {
        Ok(role)
    } else {
        Err(ApiError::Unauthorized {
            actor: actor_id.to_string(),
            action: format!("submit {} commands", kind.command()),
        })
    }
}

/// 校验审批权限
pub fn ensure_can_decide(roles: &dyn RoleDirectory, actor_id: &str) -> ApiResult<ActorRole> {
    let role = roles.role_of(actor_id);
    if role.can_decide() {
        Ok(role)
    } else {
        Err(ApiError::Unauthorized {
            actor: actor_id.to_string(),
            action: "approve or reject batches".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_rules() {
        let roles = StaticRoleDirectory::default()
            .with_role("admin", ActorRole::Admin)
            .with_role("clerk", ActorRole::Staff);

        assert!(ensure_can_submit(&roles, "clerk", MovementKind::Issue).is_ok());
        assert!(ensure_can_submit(&roles, "clerk", MovementKind::Adjustment).is_err());
        assert!(ensure_can_submit(&roles, "admin", MovementKind::Adjustment).is_ok());
        assert!(ensure_can_submit(&roles, "stranger", MovementKind::Receipt).is_err());

        assert!(ensure_can_decide(&roles, "admin").is_ok());
        assert_eq!(
            ensure_can_decide(&roles, "clerk").unwrap_err().kind(),
            "unauthorized"
        );
    }
}
