use domain::DisplayName;

/// 当前参与者的身份来源。返回 `None` 时实时会话不允许启动。
pub trait IdentitySource: Send + Sync {
    fn display_name(&self) -> Option<DisplayName>;
}

/// 在会话开始前就已确定的显示名称
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<DisplayName>);

impl StaticIdentity {
    pub fn new(name: DisplayName) -> Self {
        Self(Some(name))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentitySource for StaticIdentity {
    fn display_name(&self) -> Option<DisplayName> {
        self.0.clone()
    }
}
