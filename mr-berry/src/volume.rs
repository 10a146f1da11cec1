//! 从海马体分割标注计算物理体积.

use ndarray::ArrayView3;

use crate::consts::label::*;
use crate::consts::MM3_PER_CM3;
use crate::{Idx3d, MrLabel, NiftiHeaderAttr, SpacingMm};

/// 单个扫描的海马体体积测量值, 以立方厘米为单位.
///
/// 不变式: `total_cm3 == left_cm3 + right_cm3` (逐字面的求和, 精确成立).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HippoVolume {
    /// 左侧海马体体积.
    pub left_cm3: f64,

    /// 右侧海马体体积.
    pub right_cm3: f64,

    /// 总体积.
    pub total_cm3: f64,
}

/// 体积计算的输入校验错误.
#[derive(Debug, Clone)]
pub enum InvalidMaskError {
    /// 标注存在长度为 0 的维度.
    EmptyShape(Idx3d),

    /// 标注中出现了 0, 1, 2 以外的标签值.
    UnexpectedLabel(u8),

    /// 体素分辨率存在非正分量.
    InvalidSpacing(SpacingMm),
}

/// 由标注体积和体素分辨率计算左/右/总海马体体积.
///
/// 算法: `voxel_cm3 = (s0 * s1 * s2) / 1000`;
/// `left_cm3 = count(mask == 1) * voxel_cm3`;
/// `right_cm3 = count(mask == 2) * voxel_cm3`;
/// `total_cm3 = left_cm3 + right_cm3`.
///
/// 纯函数, 结果与体素遍历顺序无关 (非负项的交换律求和).
pub fn compute_volume(
    mask: ArrayView3<'_, u8>,
    spacing_mm: SpacingMm,
) -> Result<HippoVolume, InvalidMaskError> {
    let &[z, h, w] = mask.shape() else {
        unreachable!("ArrayView3 形状必然是三维的");
    };
    if z == 0 || h == 0 || w == 0 {
        return Err(InvalidMaskError::EmptyShape((z, h, w)));
    }
    if spacing_mm.iter().any(|s| *s <= 0.0) {
        return Err(InvalidMaskError::InvalidSpacing(spacing_mm));
    }

    let mut left = 0usize;
    let mut right = 0usize;
    for &p in mask.iter() {
        if is_left(p) {
            left += 1;
        } else if is_right(p) {
            right += 1;
        } else if !is_background(p) {
            return Err(InvalidMaskError::UnexpectedLabel(p));
        }
    }

    let voxel_cm3 = spacing_mm.iter().product::<f64>() / MM3_PER_CM3;
    let left_cm3 = left as f64 * voxel_cm3;
    let right_cm3 = right as f64 * voxel_cm3;

    Ok(HippoVolume {
        left_cm3,
        right_cm3,
        total_cm3: left_cm3 + right_cm3,
    })
}

impl MrLabel {
    /// 以 header 中记录的体素分辨率计算该标注的海马体体积.
    #[inline]
    pub fn hippo_volume(&self) -> Result<HippoVolume, InvalidMaskError> {
        compute_volume(self.data(), self.pix_dim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_compute_volume_generic() {
        // 5 个左侧体素, 3 个右侧体素, 体素体积 2 mm³.
        let mut data = Array3::<u8>::zeros((4, 4, 4));
        for i in 0..5 {
            data[(0, i / 4, i % 4)] = HIPPO_LEFT;
        }
        for i in 0..3 {
            data[(1, 0, i)] = HIPPO_RIGHT;
        }

        let vol = compute_volume(data.view(), [2.0, 1.0, 1.0]).unwrap();
        assert!(float_eq(vol.left_cm3, 5.0 * 0.002));
        assert!(float_eq(vol.right_cm3, 3.0 * 0.002));
        assert!(float_eq(vol.total_cm3, vol.left_cm3 + vol.right_cm3));
    }

    #[test]
    fn test_no_right_voxels_means_zero_right_volume() {
        let mut data = Array3::<u8>::zeros((3, 3, 3));
        data[(0, 0, 0)] = HIPPO_LEFT;
        data[(2, 2, 2)] = HIPPO_LEFT;

        let vol = compute_volume(data.view(), [1.0, 1.0, 1.25]).unwrap();
        assert_eq!(vol.right_cm3, 0.0);
        assert!(vol.left_cm3 > 0.0);
        assert_eq!(vol.total_cm3, vol.left_cm3);
    }

    #[test]
    fn test_total_is_literal_sum() {
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[(0, 0, 0)] = HIPPO_LEFT;
        data[(0, 0, 1)] = HIPPO_RIGHT;

        // 刻意选择一个无法精确表示的分辨率.
        let vol = compute_volume(data.view(), [0.9766, 0.9766, 1.2]).unwrap();
        assert_eq!(vol.total_cm3, vol.left_cm3 + vol.right_cm3);
    }

    #[test]
    fn test_invalid_inputs() {
        let empty = Array3::<u8>::zeros((0, 3, 3));
        assert!(matches!(
            compute_volume(empty.view(), [1.0, 1.0, 1.0]),
            Err(InvalidMaskError::EmptyShape(_))
        ));

        let mut bad_label = Array3::<u8>::zeros((2, 2, 2));
        bad_label[(1, 1, 1)] = 7;
        assert!(matches!(
            compute_volume(bad_label.view(), [1.0, 1.0, 1.0]),
            Err(InvalidMaskError::UnexpectedLabel(7))
        ));

        let ok = Array3::<u8>::zeros((2, 2, 2));
        assert!(matches!(
            compute_volume(ok.view(), [1.0, 0.0, 1.0]),
            Err(InvalidMaskError::InvalidSpacing(_))
        ));
    }

    #[test]
    fn test_hippo_volume_uses_header_spacing() {
        let mut data = Array3::<u8>::zeros((4, 4, 4));
        data[(0, 0, 0)] = HIPPO_LEFT;
        let label = MrLabel::fake(data, [1.0, 1.0, 1.0]);

        let vol = label.hippo_volume().unwrap();
        assert!(float_eq(vol.left_cm3, label.voxel() / 1000.0));
        assert!(float_eq(vol.total_cm3, vol.left_cm3));
    }
}
