use ndarray::{Array, ArrayBase, Data, Dimension};

/// HU 截断窗口, 包含下限和上限.
///
/// 该窗口同时定义了 `[min, max]` 到 `[-1, 1]` 的仿射归一化映射及其逆映射.
/// 窗口是只读的. 若要修改参数, 你应该创建新的实例.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HuWindow {
    min: f32,
    max: f32,
}

impl HuWindow {
    /// 构建 HU 窗口.
    ///
    /// `min` 和 `max` 必须是有限值且 `min < max`, 否则返回 `None`.
    pub fn new(min: f32, max: f32) -> Option<HuWindow> {
        (min.is_finite() && max.is_finite() && min < max).then_some(Self { min, max })
    }

    /// 默认窗口 `[-1024, 2048]`.
    #[inline]
    pub const fn from_default_range() -> HuWindow {
        Self {
            min: crate::consts::hu::DEFAULT_MIN,
            max: crate::consts::hu::DEFAULT_MAX,
        }
    }

    /// 窗下限.
    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }

    /// 窗上限.
    #[inline]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// 窗宽.
    #[inline]
    pub fn width(&self) -> f32 {
        self.max - self.min
    }

    /// 将 `hu` 截断到 `[min, max]`. NaN 保持不变.
    #[inline]
    pub fn clip(&self, hu: f32) -> f32 {
        hu.clamp(self.min, self.max)
    }

    /// 截断后线性映射到 `[-1, 1]`.
    #[inline]
    pub fn normalize(&self, hu: f32) -> f32 {
        let v = (self.clip(hu) - self.min) / self.width() * 2.0 - 1.0;
        // 浮点误差不应让结果越界.
        v.clamp(-1.0, 1.0)
    }

    /// [`Self::normalize`] 的逆映射. 不做截断.
    #[inline]
    pub fn denormalize(&self, v: f32) -> f32 {
        (v + 1.0) / 2.0 * self.width() + self.min
    }

    /// 对整个数组截断.
    pub fn clip_array<S, D>(&self, data: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        data.mapv(|v| self.clip(v))
    }

    /// 对整个数组归一化.
    pub fn normalize_array<S, D>(&self, data: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        data.mapv(|v| self.normalize(v))
    }

    /// 对整个数组反归一化.
    pub fn denormalize_array<S, D>(&self, data: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        data.mapv(|v| self.denormalize(v))
    }
}

impl Default for HuWindow {
    #[inline]
    fn default() -> Self {
        Self::from_default_range()
    }
}
