/// 消息列表的滚动位置，单位像素
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollViewport {
    pub scroll_top: u32,
    pub scroll_height: u32,
    pub client_height: u32,
}

pub const DEFAULT_BOTTOM_THRESHOLD_PX: u32 = 50;

impl ScrollViewport {
    pub fn new(scroll_top: u32, scroll_height: u32, client_height: u32) -> Self {
        Self {
            scroll_top,
            scroll_height,
            client_height,
        }
    }

    /// 距底部不足 `threshold` 像素即视为在底部
    pub fn is_at_bottom(&self, threshold: u32) -> bool {
        self.scroll_top.abs_diff(self.bottom_offset()) < threshold
    }

    pub fn bottom_offset(&self) -> u32 {
        self.scroll_height.saturating_sub(self.client_height)
    }
}
