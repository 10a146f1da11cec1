use std::ops::Index;
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, Ix3, Zip};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::consts::label::*;
use crate::{Idx3d, Predicate, SpacingMm};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小.
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, h, w) = self.shape();
        z * h * w
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, h0, w0): &Idx3d) -> bool {
        let (z, h, w) = self.shape();
        *z0 < z && *h0 < h && *w0 < w
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表空间 (相邻切片方向),
    /// 高 (自然图像的垂直方向), 宽 (自然图像的水平方向).
    #[inline]
    fn pix_dim(&self) -> SpacingMm {
        let [_, w, h, z, ..] = self.header().pixdim;
        [z as f64, h as f64, w as f64]
    }

    /// 获取体素的实际体积值, 以立方毫米为单位.
    #[inline]
    fn voxel(&self) -> f64 {
        self.pix_dim().iter().product()
    }
}

/// nii 格式 3D 脑部 MRI 扫描, 包括 header 和体素强度. 强度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct MrScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MrScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MrScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl MrScan {
    /// 打开 nii 文件格式的 3D MRI 扫描. `path` 为 nii 文件
    /// (或 hdr/img 文件对中 header 文件) 的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将扫描按原 nifti 轴序写到 `path`. 以 `.nii.gz` 结尾的路径会被压缩存储.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // [z, H, W] -> [W, H, z].
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 根据裸强度数据和体素分辨率直接创建 `MrScan` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储, 且非空.
    /// 2. `pix_dim` 按照 \[w, h, z\] 格式存储, 每个分量为正.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>, pix_dim: [f32; 3]) -> Self {
        let header = fake_header(data.shape(), pix_dim);

        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 返回一份被二值掩码约束后的扫描拷贝: `mask` 为背景处的体素被置零,
    /// 其余体素原样保留.
    ///
    /// 若两者形状不一致, 则程序 panic.
    pub fn masked(&self, mask: &MrLabel) -> MrScan {
        assert_eq!(self.shape(), mask.shape(), "扫描和掩码形状不一致");
        let mut out = self.clone();
        Zip::from(&mut out.data)
            .and(&mask.data)
            .for_each(|v, &m| {
                if is_background(m) {
                    *v = 0.0;
                }
            });
        out
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, f32, Ix3> {
        self.data.view_mut()
    }
}

/// nii 格式 3D 标注, 包括 header 和标签值. 标签值以 `u8` 保存.
///
/// 同一结构同时建模颅骨剥离掩码 (0/1) 和海马体分割结果 (0/1/2),
/// 两者的区别只在取值范围.
#[derive(Debug, Clone)]
pub struct MrLabel {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for MrLabel {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MrLabel {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl MrLabel {
    /// 打开 nii 文件格式的 3D 标注. `path` 为 nii 文件的本地路径. 如果打开成功,
    /// 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W]
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<u8>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将标注按原 nifti 轴序写到 `path`. 以 `.nii.gz` 结尾的路径会被压缩存储.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // [z, H, W] -> [W, H, z].
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)
    }

    /// 根据裸标签数据和体素分辨率直接创建 `MrLabel` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 的数据必须非空, 且为 0, 1 或 2. 否则程序行为未定义.
    /// 2. `data` 按照 nifti 惯用标准以 \[w, h, z\] 格式存储.
    /// 3. `pix_dim` 按照 \[w, h, z\] 格式存储.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<u8>, pix_dim: [f32; 3]) -> Self {
        let header = fake_header(data.shape(), pix_dim);

        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        Self { header, data }
    }

    /// 直接从已有 header 创建数据.
    ///
    /// # 注意
    ///
    /// **目前** 你应当使输入满足以下性质, 否则程序行为未定义:
    ///
    /// 1. `data` 按照 \[width, height, z\] 组织, 内部体素值非空,
    ///   且必须为 0, 1 或 2.
    /// 2. `header` 必须满足其格式标准, 且与 `data` 形状一致.
    pub fn fake_with_header(header: &NiftiHeader, data: Array3<u8>) -> Self {
        let data = data.permuted_axes([2, 1, 0]);
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        debug_assert!(data.is_standard_layout());

        let mut header = Box::new(header.clone());
        header.intent_name[..4].copy_from_slice(b"fake");
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake_*` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取 3D 标注中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 获取标注的基本统计信息.
    ///
    /// 统计信息格式为: \[背景体素数, 左侧海马体体素数, 右侧海马体体素数\].
    /// 该操作不会统计任何其他体素信息.
    pub fn numeric_statistics(&self) -> [usize; 3] {
        let mut ans = [0; 3];
        for pixel in self.data.iter().filter(|p| **p <= HIPPO_RIGHT) {
            ans[*pixel as usize] += 1;
        }
        ans
    }

    /// 收集满足谓词 `pred` 的所有体素对应的下标, 结果按行优先存储.
    pub fn filter_pos(&self, pred: Predicate) -> Vec<Idx3d> {
        self.data
            .indexed_iter()
            .filter_map(|(ref pos, pixel)| pred(*pixel).then_some(*pos))
            .collect()
    }

    /// 收集所有海马体 (左 + 右) 体素对应的下标. 结果按行优先存储.
    #[inline]
    pub fn hippocampus_pos(&self) -> Vec<Idx3d> {
        self.filter_pos(is_hippocampus)
    }

    /// 收集所有左侧海马体体素对应的下标. 结果按行优先存储.
    #[inline]
    pub fn left_pos(&self) -> Vec<Idx3d> {
        self.filter_pos(is_left)
    }

    /// 收集所有右侧海马体体素对应的下标. 结果按行优先存储.
    #[inline]
    pub fn right_pos(&self) -> Vec<Idx3d> {
        self.filter_pos(is_right)
    }
}

/// 按 `fake_*` 约定拼接一个最小可用的 header.
fn fake_header(shape: &[usize], pix_dim: [f32; 3]) -> BoxedHeader {
    let mut header = Box::<NiftiHeader>::default();

    let &[w, h, z] = shape else {
        panic!("fake 数据必须是三维的, 但形状为 {shape:?}");
    };
    header.dim = [3, w as u16, h as u16, z as u16, 1, 1, 1, 1];

    let [_, pw, ph, pz, ..] = &mut header.pixdim;
    let [w, h, z] = &pix_dim;
    (*pw, *ph, *pz) = (*w, *h, *z);

    header.intent_name[..4].copy_from_slice(b"fake");
    header
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 并发操作部分
#[cfg(feature = "rayon")]
impl MrLabel {
    /// 借助 `rayon`, 并行地统计 3D 标注中值为 `label` 的体素个数.
    pub fn par_count(&self, label: u8) -> usize {
        self.data
            .axis_iter(ndarray::Axis(0))
            .into_par_iter()
            .map(|s| s.iter().filter(|p| **p == label).count())
            .sum()
    }
}
