//! Strided read/write.
//!
//! [`Array::read`] and [`Array::write`] copy an n-dimensional window between the chunk grid
//! and a caller buffer, converting between the array data type and the buffer data type.
//! Axis steps may be negative; buffer strides are positive element strides. The window is
//! decomposed into the intersecting chunks, each loaded (or initialized) lazily through the
//! chunk cache, with word-copy fast paths when no conversion is needed and fill fast paths
//! for absent chunks.

use std::sync::Arc;

use super::{Array, Element, chunk_cache::CachedChunk, data_type::DataType};
use crate::error::ZarrError;

/// The per-axis plan of a strided window, normalized to ascending source order.
#[derive(Clone, Debug)]
struct AxisPlan {
    /// First source index (lowest, after normalizing a negative step).
    src_first: u64,
    /// Number of samples.
    count: u64,
    /// Source step (positive).
    src_step: u64,
    /// Buffer element index of the first (lowest-index) sample along this axis.
    buf_first: i64,
    /// Buffer element stride per ascending source sample; negative for reversed axes.
    buf_step: i64,
}

fn plan_axes(
    shape: &[u64],
    origin: &[u64],
    count: &[u64],
    step: &[i64],
    buf_stride: &[u64],
) -> Result<Vec<AxisPlan>, ZarrError> {
    let mut axes = Vec::with_capacity(shape.len());
    for axis in 0..shape.len() {
        let (origin, count, step, stride) =
            (origin[axis], count[axis], step[axis], buf_stride[axis]);
        if count == 0 {
            return Err(ZarrError::invalid_argument(format!(
                "count must be at least 1 on axis {axis}"
            )));
        }
        if step == 0 {
            return Err(ZarrError::invalid_argument(format!(
                "step must be non-zero on axis {axis}"
            )));
        }
        let last = i128::from(origin) + i128::from(count - 1) * i128::from(step);
        if origin >= shape[axis] || last < 0 || last >= i128::from(shape[axis]) {
            return Err(ZarrError::invalid_argument(format!(
                "window origin {origin} count {count} step {step} exceeds size {} on axis {axis}",
                shape[axis]
            )));
        }
        let stride = i64::try_from(stride)
            .map_err(|_| ZarrError::invalid_argument("buffer stride overflows".to_string()))?;
        #[allow(clippy::cast_sign_loss)]
        let plan = if step > 0 {
            AxisPlan {
                src_first: origin,
                count,
                src_step: step as u64,
                buf_first: 0,
                buf_step: stride,
            }
        } else {
            // Normalize to ascending source order; the buffer walks backwards.
            AxisPlan {
                src_first: u64::try_from(last).expect("validated non-negative"),
                count,
                src_step: step.unsigned_abs(),
                buf_first: i64::try_from(count - 1).unwrap() * stride,
                buf_step: -stride,
            }
        };
        axes.push(plan);
    }
    Ok(axes)
}

/// The intersection of a planned window with one chunk.
#[derive(Clone, Debug)]
struct ChunkSlice {
    /// First sample index (into the planned progression) inside the chunk, per axis.
    local_first: Vec<u64>,
    /// Samples inside the chunk, per axis.
    n: Vec<u64>,
    /// Buffer element index of the first sample, per axis contribution.
    buf_first: Vec<i64>,
    /// Buffer element stride per sample, per axis.
    buf_step: Vec<i64>,
    /// Source step within the chunk, per axis.
    src_step: Vec<u64>,
    /// Whether the slice covers the full valid extent of the chunk with unit steps.
    covers_chunk: bool,
}

fn slice_for_chunk(
    axes: &[AxisPlan],
    chunk_indices: &[u64],
    chunk_shape: &[u64],
    array_shape: &[u64],
) -> Option<ChunkSlice> {
    let rank = axes.len();
    let mut slice = ChunkSlice {
        local_first: Vec::with_capacity(rank),
        n: Vec::with_capacity(rank),
        buf_first: Vec::with_capacity(rank),
        buf_step: Vec::with_capacity(rank),
        src_step: Vec::with_capacity(rank),
        covers_chunk: true,
    };
    for axis in 0..rank {
        let plan = &axes[axis];
        let chunk_start = chunk_indices[axis] * chunk_shape[axis];
        let chunk_end = ((chunk_indices[axis] + 1) * chunk_shape[axis]).min(array_shape[axis]);
        if chunk_end <= chunk_start {
            return None;
        }
        let k_lo = if plan.src_first >= chunk_start {
            0
        } else {
            (chunk_start - plan.src_first).div_ceil(plan.src_step)
        };
        if plan.src_first + k_lo * plan.src_step >= chunk_end || k_lo >= plan.count {
            return None;
        }
        let k_hi = ((chunk_end - 1 - plan.src_first) / plan.src_step).min(plan.count - 1);
        let n = k_hi - k_lo + 1;
        let local_first = plan.src_first + k_lo * plan.src_step - chunk_start;
        slice.covers_chunk &= plan.src_step == 1
            && local_first == 0
            && n == chunk_end - chunk_start;
        slice.local_first.push(local_first);
        slice.n.push(n);
        slice
            .buf_first
            .push(plan.buf_first + i64::try_from(k_lo).unwrap() * plan.buf_step);
        slice.buf_step.push(plan.buf_step);
        slice.src_step.push(plan.src_step);
    }
    Some(slice)
}

/// Row-major strides (in elements) of a chunk of `chunk_shape`.
fn chunk_strides(chunk_shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; chunk_shape.len()];
    for axis in (0..chunk_shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * chunk_shape[axis + 1];
    }
    strides
}

impl Array {
    /// Read a strided window into a caller buffer.
    ///
    /// Copies the window described by `origin`, `count` and `step` (per axis; steps may be
    /// negative) into `buffer` with `buffer_stride` (positive, in `buffer_data_type`
    /// elements per axis), converting each element from the array data type.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] for an out-of-bounds window, an unsupported data type
    /// conversion, an undersized buffer, or a failing load.
    pub fn read(
        &self,
        origin: &[u64],
        count: &[u64],
        step: &[i64],
        buffer_stride: &[u64],
        buffer_data_type: &DataType,
        buffer: &mut [u8],
    ) -> Result<(), ZarrError> {
        self.check_not_deleted()?;
        let shape = self.shape();
        self.validate_window_args(&shape, origin, count, step, buffer_stride)?;
        if !convertible(&self.data_type, buffer_data_type) {
            return Err(ZarrError::invalid_argument(format!(
                "cannot convert {} to {buffer_data_type}",
                self.data_type
            )));
        }
        let buf_el = buffer_data_type.size();
        let required = required_elements(count, buffer_stride);
        if buffer.len() < required * buf_el {
            return Err(ZarrError::invalid_argument(format!(
                "buffer of {} bytes is too small for {required} elements of {buffer_data_type}",
                buffer.len()
            )));
        }

        let axes = plan_axes(&shape, origin, count, step, buffer_stride)?;
        let chunk_shape = self.inner_chunk_shape().to_vec();
        let strides = chunk_strides(&chunk_shape);
        let src_el = self.data_type.size();
        let fill = self.effective_fill_value();
        let fill_buf = convert_fill(&self.data_type, fill.as_ne_bytes(), buffer_data_type);
        let same_type = &self.data_type == buffer_data_type;
        let optimized = self.ctx().env().use_optimized_code_paths;

        self.for_each_chunk_slice(&axes, &chunk_shape, &shape, |this, indices, slice| {
            let chunk = this.chunk_for_read(indices)?;
            match chunk {
                ReadChunk::Fill => copy_fill_to_buffer(&slice, &fill_buf, buffer, buf_el),
                ReadChunk::Shared(bytes) => copy_chunk_to_buffer(
                    &slice,
                    &bytes,
                    &strides,
                    src_el,
                    &this.data_type,
                    buffer,
                    buf_el,
                    buffer_data_type,
                    same_type && optimized,
                ),
                ReadChunk::Slot => {
                    let cache = this.cache.lock();
                    if cache.current.empty {
                        copy_fill_to_buffer(&slice, &fill_buf, buffer, buf_el);
                    } else {
                        copy_chunk_to_buffer(
                            &slice,
                            &cache.current.buffer,
                            &strides,
                            src_el,
                            &this.data_type,
                            buffer,
                            buf_el,
                            buffer_data_type,
                            same_type && optimized,
                        );
                    }
                }
            }
            Ok(())
        })
    }

    /// Write a strided window from a caller buffer.
    ///
    /// Mirrors [`read`](Array::read): the window described by `origin`, `count` and `step`
    /// receives the elements of `buffer` (strided by `buffer_stride`, typed
    /// `buffer_data_type`), converted to the array data type. Writes batch in the current
    /// chunk slot; touching a different chunk flushes the slot.
    ///
    /// A window covering a whole chunk (up to the array bounds) initializes the chunk
    /// without loading it; partial windows load (or fill-initialize) the chunk first.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a read-only array, an out-of-bounds window, an
    /// unsupported conversion, or a failing load or flush.
    pub fn write(
        &self,
        origin: &[u64],
        count: &[u64],
        step: &[i64],
        buffer_stride: &[u64],
        buffer_data_type: &DataType,
        buffer: &[u8],
    ) -> Result<(), ZarrError> {
        self.check_writable()?;
        let shape = self.shape();
        self.validate_window_args(&shape, origin, count, step, buffer_stride)?;
        if !convertible(buffer_data_type, &self.data_type) {
            return Err(ZarrError::invalid_argument(format!(
                "cannot convert {buffer_data_type} to {}",
                self.data_type
            )));
        }
        let buf_el = buffer_data_type.size();
        let required = required_elements(count, buffer_stride);
        if buffer.len() < required * buf_el {
            return Err(ZarrError::invalid_argument(format!(
                "buffer of {} bytes is too small for {required} elements of {buffer_data_type}",
                buffer.len()
            )));
        }

        let axes = plan_axes(&shape, origin, count, step, buffer_stride)?;
        let chunk_shape = self.inner_chunk_shape().to_vec();
        let strides = chunk_strides(&chunk_shape);
        let dst_el = self.data_type.size();
        let same_type = &self.data_type == buffer_data_type;
        let optimized = self.ctx().env().use_optimized_code_paths;

        self.for_each_chunk_slice(&axes, &chunk_shape, &shape, |this, indices, slice| {
            let mut cache = this.cache.lock();
            this.prepare_slot_for_write(&mut cache, indices, slice.covers_chunk)?;
            copy_buffer_to_chunk(
                &slice,
                buffer,
                buf_el,
                buffer_data_type,
                &mut cache.current.buffer,
                &strides,
                dst_el,
                &this.data_type,
                same_type && optimized,
            );
            cache.current.dirty = true;
            cache.current.empty = false;
            Ok(())
        })
    }

    fn validate_window_args(
        &self,
        shape: &[u64],
        origin: &[u64],
        count: &[u64],
        step: &[i64],
        buffer_stride: &[u64],
    ) -> Result<(), ZarrError> {
        let rank = self.dimensionality();
        if origin.len() != rank
            || count.len() != rank
            || step.len() != rank
            || buffer_stride.len() != rank
        {
            return Err(ZarrError::invalid_argument(format!(
                "window arguments must have rank {rank}"
            )));
        }
        debug_assert_eq!(shape.len(), rank);
        Ok(())
    }

    /// Iterate the chunks intersecting a planned window in row-major chunk order.
    fn for_each_chunk_slice(
        &self,
        axes: &[AxisPlan],
        chunk_shape: &[u64],
        array_shape: &[u64],
        mut body: impl FnMut(&Self, &[u64], ChunkSlice) -> Result<(), ZarrError>,
    ) -> Result<(), ZarrError> {
        let rank = axes.len();
        let chunk_lo: Vec<u64> = (0..rank)
            .map(|axis| axes[axis].src_first / chunk_shape[axis])
            .collect();
        let chunk_hi: Vec<u64> = (0..rank)
            .map(|axis| {
                (axes[axis].src_first + (axes[axis].count - 1) * axes[axis].src_step)
                    / chunk_shape[axis]
            })
            .collect();

        let mut indices = chunk_lo.clone();
        loop {
            if let Some(slice) = slice_for_chunk(axes, &indices, chunk_shape, array_shape) {
                body(self, &indices, slice)?;
            }
            // Row-major odometer over the chunk range.
            let mut axis = rank;
            loop {
                if axis == 0 {
                    return Ok(());
                }
                axis -= 1;
                indices[axis] += 1;
                if indices[axis] <= chunk_hi[axis] {
                    break;
                }
                indices[axis] = chunk_lo[axis];
            }
        }
    }

    /// Read typed elements of a contiguous row-major window.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if `T` does not convert from the array data type or the
    /// window is invalid.
    pub fn read_elements<T: Element>(
        &self,
        origin: &[u64],
        count: &[u64],
    ) -> Result<Vec<T>, ZarrError> {
        let rank = self.dimensionality();
        let num_elements: u64 = count.iter().product();
        let num_elements = usize::try_from(num_elements)
            .map_err(|_| ZarrError::OutOfMemory(u64::MAX))?;
        let data_type = T::data_type();
        let mut bytes = vec![0u8; num_elements * data_type.size()];
        self.read(
            origin,
            count,
            &vec![1i64; rank],
            &contiguous_strides(count),
            &data_type,
            &mut bytes,
        )?;
        Ok(super::transmute_from_bytes_vec(bytes))
    }

    /// Write typed elements of a contiguous row-major window.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] if `T` does not convert to the array data type, the window
    /// is invalid, or `elements` has the wrong length.
    pub fn write_elements<T: Element>(
        &self,
        origin: &[u64],
        count: &[u64],
        elements: &[T],
    ) -> Result<(), ZarrError> {
        let rank = self.dimensionality();
        let num_elements: u64 = count.iter().product();
        if elements.len() as u64 != num_elements {
            return Err(ZarrError::invalid_argument(format!(
                "{} elements provided for a window of {num_elements}",
                elements.len()
            )));
        }
        let data_type = T::data_type();
        self.write(
            origin,
            count,
            &vec![1i64; rank],
            &contiguous_strides(count),
            &data_type,
            bytemuck::cast_slice(elements),
        )
    }

    /// Read string elements of a contiguous row-major window of an ASCII or UCS-4 array.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a non-string array or an invalid window.
    pub fn read_string_elements(
        &self,
        origin: &[u64],
        count: &[u64],
    ) -> Result<Vec<String>, ZarrError> {
        let rank = self.dimensionality();
        let num_elements: u64 = count.iter().product();
        let num_elements = usize::try_from(num_elements)
            .map_err(|_| ZarrError::OutOfMemory(u64::MAX))?;
        let element_size = self.data_type().size();
        let mut bytes = vec![0u8; num_elements * element_size];
        self.read(
            origin,
            count,
            &vec![1i64; rank],
            &contiguous_strides(count),
            &self.data_type().clone(),
            &mut bytes,
        )?;
        bytes
            .chunks_exact(element_size)
            .map(|element| decode_string_element(self.data_type(), element))
            .collect()
    }

    /// Write string elements of a contiguous row-major window of an ASCII or UCS-4 array.
    ///
    /// Strings longer than the fixed element width are truncated; shorter ones are
    /// NUL-padded.
    ///
    /// # Errors
    /// Returns a [`ZarrError`] on a non-string array or an invalid window.
    pub fn write_string_elements(
        &self,
        origin: &[u64],
        count: &[u64],
        elements: &[String],
    ) -> Result<(), ZarrError> {
        let rank = self.dimensionality();
        let num_elements: u64 = count.iter().product();
        if elements.len() as u64 != num_elements {
            return Err(ZarrError::invalid_argument(format!(
                "{} elements provided for a window of {num_elements}",
                elements.len()
            )));
        }
        let element_size = self.data_type().size();
        let mut bytes = Vec::with_capacity(elements.len() * element_size);
        for element in elements {
            encode_string_element(self.data_type(), element, &mut bytes)?;
        }
        self.write(
            origin,
            count,
            &vec![1i64; rank],
            &contiguous_strides(count),
            &self.data_type().clone(),
            &bytes,
        )
    }
}

/// Contiguous row-major buffer strides for a window of `count`.
#[must_use]
pub(crate) fn contiguous_strides(count: &[u64]) -> Vec<u64> {
    let mut strides = vec![1u64; count.len()];
    for axis in (0..count.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * count[axis + 1];
    }
    strides
}

fn required_elements(count: &[u64], stride: &[u64]) -> usize {
    let last: u64 = std::iter::zip(count, stride)
        .map(|(&count, &stride)| (count - 1) * stride)
        .sum();
    usize::try_from(last + 1).unwrap_or(usize::MAX)
}

/// The source of chunk bytes for a read.
enum ReadChunk {
    /// The chunk is absent; the window reads as fill.
    Fill,
    /// A prefetched buffer shared with the cache map.
    Shared(Arc<Vec<u8>>),
    /// The chunk occupies the current slot.
    Slot,
}

impl Array {
    /// Resolve the chunk at `indices` for reading: the prefetch map first, then the
    /// current slot, loading into the slot on a miss.
    fn chunk_for_read(&self, indices: &[u64]) -> Result<ReadChunk, ZarrError> {
        let mut cache = self.cache.lock();
        // Unflushed writes in the slot supersede any prefetched copy.
        if cache.slot_holds(indices) && cache.current.dirty {
            return Ok(ReadChunk::Slot);
        }
        if let Some(cached) = cache.lookup_map(indices) {
            return Ok(match cached {
                CachedChunk::Present(bytes) => ReadChunk::Shared(bytes),
                CachedChunk::Missing => ReadChunk::Fill,
            });
        }
        if cache.slot_holds(indices) {
            return Ok(ReadChunk::Slot);
        }
        self.load_into_slot(&mut cache, indices)?;
        Ok(ReadChunk::Slot)
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_chunk_to_buffer(
    slice: &ChunkSlice,
    chunk: &[u8],
    chunk_strides: &[u64],
    src_el: usize,
    src_type: &DataType,
    buffer: &mut [u8],
    buf_el: usize,
    buf_type: &DataType,
    direct_copy: bool,
) {
    let rank = slice.n.len();
    let last = rank - 1;
    let mut j = vec![0u64; last];
    loop {
        // Base offsets of this innermost row.
        let mut src_base: u64 = slice.local_first[last] * chunk_strides[last];
        let mut buf_base: i64 = slice.buf_first[last];
        for axis in 0..last {
            src_base += (slice.local_first[axis] + j[axis] * slice.src_step[axis])
                * chunk_strides[axis];
            buf_base +=
                slice.buf_first[axis] + i64::try_from(j[axis]).unwrap() * slice.buf_step[axis];
        }
        let n = slice.n[last];
        if direct_copy && slice.src_step[last] == 1 && slice.buf_step[last] == 1 {
            let src_off = usize::try_from(src_base).unwrap() * src_el;
            let buf_off = usize::try_from(buf_base).unwrap() * buf_el;
            let len = usize::try_from(n).unwrap() * src_el;
            buffer[buf_off..buf_off + len].copy_from_slice(&chunk[src_off..src_off + len]);
        } else {
            for k in 0..n {
                let src_off =
                    usize::try_from(src_base + k * slice.src_step[last]).unwrap() * src_el;
                let buf_off = usize::try_from(
                    buf_base + i64::try_from(k).unwrap() * slice.buf_step[last],
                )
                .unwrap()
                    * buf_el;
                convert_element(
                    src_type,
                    &chunk[src_off..src_off + src_el],
                    buf_type,
                    &mut buffer[buf_off..buf_off + buf_el],
                );
            }
        }
        // Advance the outer odometer.
        let mut axis = last;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            j[axis] += 1;
            if j[axis] < slice.n[axis] {
                break;
            }
            j[axis] = 0;
        }
    }
}

fn copy_fill_to_buffer(slice: &ChunkSlice, fill: &[u8], buffer: &mut [u8], buf_el: usize) {
    let rank = slice.n.len();
    let last = rank - 1;
    let mut j = vec![0u64; last];
    loop {
        let mut buf_base: i64 = slice.buf_first[last];
        for axis in 0..last {
            buf_base +=
                slice.buf_first[axis] + i64::try_from(j[axis]).unwrap() * slice.buf_step[axis];
        }
        for k in 0..slice.n[last] {
            let buf_off = usize::try_from(
                buf_base + i64::try_from(k).unwrap() * slice.buf_step[last],
            )
            .unwrap()
                * buf_el;
            buffer[buf_off..buf_off + buf_el].copy_from_slice(fill);
        }
        let mut axis = last;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            j[axis] += 1;
            if j[axis] < slice.n[axis] {
                break;
            }
            j[axis] = 0;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn copy_buffer_to_chunk(
    slice: &ChunkSlice,
    buffer: &[u8],
    buf_el: usize,
    buf_type: &DataType,
    chunk: &mut [u8],
    chunk_strides: &[u64],
    dst_el: usize,
    dst_type: &DataType,
    direct_copy: bool,
) {
    let rank = slice.n.len();
    let last = rank - 1;
    let mut j = vec![0u64; last];
    loop {
        let mut dst_base: u64 = slice.local_first[last] * chunk_strides[last];
        let mut buf_base: i64 = slice.buf_first[last];
        for axis in 0..last {
            dst_base += (slice.local_first[axis] + j[axis] * slice.src_step[axis])
                * chunk_strides[axis];
            buf_base +=
                slice.buf_first[axis] + i64::try_from(j[axis]).unwrap() * slice.buf_step[axis];
        }
        let n = slice.n[last];
        if direct_copy && slice.src_step[last] == 1 && slice.buf_step[last] == 1 {
            let dst_off = usize::try_from(dst_base).unwrap() * dst_el;
            let buf_off = usize::try_from(buf_base).unwrap() * buf_el;
            let len = usize::try_from(n).unwrap() * dst_el;
            chunk[dst_off..dst_off + len].copy_from_slice(&buffer[buf_off..buf_off + len]);
        } else {
            for k in 0..n {
                let dst_off =
                    usize::try_from(dst_base + k * slice.src_step[last]).unwrap() * dst_el;
                let buf_off = usize::try_from(
                    buf_base + i64::try_from(k).unwrap() * slice.buf_step[last],
                )
                .unwrap()
                    * buf_el;
                convert_element(
                    buf_type,
                    &buffer[buf_off..buf_off + buf_el],
                    dst_type,
                    &mut chunk[dst_off..dst_off + dst_el],
                );
            }
        }
        let mut axis = last;
        loop {
            if axis == 0 {
                return;
            }
            axis -= 1;
            j[axis] += 1;
            if j[axis] < slice.n[axis] {
                break;
            }
            j[axis] = 0;
        }
    }
}

/// A numeric value in transit between data types.
#[derive(Copy, Clone, Debug)]
enum Scalar {
    Int(i64),
    UInt(u64),
    Float(f64),
    Complex(f64, f64),
}

impl Scalar {
    fn as_f64(self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        match self {
            Self::Int(value) => value as f64,
            Self::UInt(value) => value as f64,
            Self::Float(value) => value,
            Self::Complex(re, _) => re,
        }
    }

    fn as_complex(self) -> (f64, f64) {
        match self {
            Self::Complex(re, im) => (re, im),
            other => (other.as_f64(), 0.0),
        }
    }
}

/// Return true if elements convert from `src` to `dst`.
///
/// Numeric types interconvert (complex to real takes the real component); string and
/// compound types only copy to the identical type.
pub(crate) fn convertible(src: &DataType, dst: &DataType) -> bool {
    if src.is_numeric() && dst.is_numeric() {
        true
    } else {
        src == dst
    }
}

fn read_scalar(data_type: &DataType, bytes: &[u8]) -> Scalar {
    match data_type {
        DataType::Bool => Scalar::UInt(u64::from(bytes[0] != 0)),
        DataType::Int8 => Scalar::Int(i64::from(i8::from_ne_bytes([bytes[0]]))),
        DataType::Int16 => Scalar::Int(i64::from(i16::from_ne_bytes(bytes[..2].try_into().unwrap()))),
        DataType::Int32 => Scalar::Int(i64::from(i32::from_ne_bytes(bytes[..4].try_into().unwrap()))),
        DataType::Int64 => Scalar::Int(i64::from_ne_bytes(bytes[..8].try_into().unwrap())),
        DataType::UInt8 => Scalar::UInt(u64::from(bytes[0])),
        DataType::UInt16 => Scalar::UInt(u64::from(u16::from_ne_bytes(bytes[..2].try_into().unwrap()))),
        DataType::UInt32 => Scalar::UInt(u64::from(u32::from_ne_bytes(bytes[..4].try_into().unwrap()))),
        DataType::UInt64 => Scalar::UInt(u64::from_ne_bytes(bytes[..8].try_into().unwrap())),
        DataType::Float16 => Scalar::Float(half::f16::from_ne_bytes(bytes[..2].try_into().unwrap()).to_f64()),
        DataType::Float32 => Scalar::Float(f64::from(f32::from_ne_bytes(bytes[..4].try_into().unwrap()))),
        DataType::Float64 => Scalar::Float(f64::from_ne_bytes(bytes[..8].try_into().unwrap())),
        DataType::Complex64 => Scalar::Complex(
            f64::from(f32::from_ne_bytes(bytes[..4].try_into().unwrap())),
            f64::from(f32::from_ne_bytes(bytes[4..8].try_into().unwrap())),
        ),
        DataType::Complex128 => Scalar::Complex(
            f64::from_ne_bytes(bytes[..8].try_into().unwrap()),
            f64::from_ne_bytes(bytes[8..16].try_into().unwrap()),
        ),
        DataType::Ascii(_) | DataType::Unicode(_) | DataType::Compound(_) => {
            unreachable!("non-numeric types never reach scalar conversion")
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_scalar(scalar: Scalar, data_type: &DataType, bytes: &mut [u8]) {
    fn to_i64(scalar: Scalar, min: i64, max: i64) -> i64 {
        match scalar {
            Scalar::Int(value) => value.clamp(min, max),
            Scalar::UInt(value) => i64::try_from(value).unwrap_or(i64::MAX).clamp(min, max),
            Scalar::Float(value) | Scalar::Complex(value, _) => {
                #[allow(clippy::cast_precision_loss)]
                if value.is_nan() {
                    0
                } else {
                    value.round().clamp(min as f64, max as f64) as i64
                }
            }
        }
    }
    fn to_u64(scalar: Scalar, max: u64) -> u64 {
        match scalar {
            Scalar::Int(value) => u64::try_from(value.max(0)).unwrap_or(0).min(max),
            Scalar::UInt(value) => value.min(max),
            Scalar::Float(value) | Scalar::Complex(value, _) => {
                #[allow(clippy::cast_precision_loss)]
                if value.is_nan() || value <= 0.0 {
                    0
                } else {
                    value.round().min(max as f64) as u64
                }
            }
        }
    }
    match data_type {
        DataType::Bool => bytes[0] = u8::from(scalar.as_f64() != 0.0),
        DataType::Int8 => {
            bytes[0] = (to_i64(scalar, i64::from(i8::MIN), i64::from(i8::MAX)) as i8).to_ne_bytes()[0];
        }
        DataType::Int16 => bytes[..2].copy_from_slice(
            &(to_i64(scalar, i64::from(i16::MIN), i64::from(i16::MAX)) as i16).to_ne_bytes(),
        ),
        DataType::Int32 => bytes[..4].copy_from_slice(
            &(to_i64(scalar, i64::from(i32::MIN), i64::from(i32::MAX)) as i32).to_ne_bytes(),
        ),
        DataType::Int64 => {
            bytes[..8].copy_from_slice(&to_i64(scalar, i64::MIN, i64::MAX).to_ne_bytes());
        }
        DataType::UInt8 => bytes[0] = to_u64(scalar, u64::from(u8::MAX)) as u8,
        DataType::UInt16 => bytes[..2]
            .copy_from_slice(&(to_u64(scalar, u64::from(u16::MAX)) as u16).to_ne_bytes()),
        DataType::UInt32 => bytes[..4]
            .copy_from_slice(&(to_u64(scalar, u64::from(u32::MAX)) as u32).to_ne_bytes()),
        DataType::UInt64 => {
            bytes[..8].copy_from_slice(&to_u64(scalar, u64::MAX).to_ne_bytes());
        }
        DataType::Float16 => bytes[..2]
            .copy_from_slice(&half::f16::from_f64(scalar.as_f64()).to_ne_bytes()),
        DataType::Float32 => {
            bytes[..4].copy_from_slice(&(scalar.as_f64() as f32).to_ne_bytes());
        }
        DataType::Float64 => bytes[..8].copy_from_slice(&scalar.as_f64().to_ne_bytes()),
        DataType::Complex64 => {
            let (re, im) = scalar.as_complex();
            bytes[..4].copy_from_slice(&(re as f32).to_ne_bytes());
            bytes[4..8].copy_from_slice(&(im as f32).to_ne_bytes());
        }
        DataType::Complex128 => {
            let (re, im) = scalar.as_complex();
            bytes[..8].copy_from_slice(&re.to_ne_bytes());
            bytes[8..16].copy_from_slice(&im.to_ne_bytes());
        }
        DataType::Ascii(_) | DataType::Unicode(_) | DataType::Compound(_) => {
            unreachable!("non-numeric types never reach scalar conversion")
        }
    }
}

/// Convert one element between data types.
pub(crate) fn convert_element(
    src_type: &DataType,
    src: &[u8],
    dst_type: &DataType,
    dst: &mut [u8],
) {
    if src_type == dst_type {
        dst.copy_from_slice(src);
    } else {
        write_scalar(read_scalar(src_type, src), dst_type, dst);
    }
}

/// Convert a fill value element to the buffer data type.
pub(crate) fn convert_fill(src_type: &DataType, fill: &[u8], dst_type: &DataType) -> Vec<u8> {
    let mut out = vec![0u8; dst_type.size()];
    convert_element(src_type, fill, dst_type, &mut out);
    out
}

fn decode_string_element(data_type: &DataType, bytes: &[u8]) -> Result<String, ZarrError> {
    match data_type {
        DataType::Ascii(_) => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        DataType::Unicode(_) => {
            let mut out = String::new();
            for unit in bytes.chunks_exact(4) {
                let unit = u32::from_ne_bytes(unit.try_into().unwrap());
                if unit == 0 {
                    break;
                }
                out.push(char::from_u32(unit).ok_or_else(|| {
                    ZarrError::format(format!("invalid UCS-4 code unit {unit:#x}"))
                })?);
            }
            Ok(out)
        }
        other => Err(ZarrError::invalid_argument(format!(
            "{other} is not a string data type"
        ))),
    }
}

fn encode_string_element(
    data_type: &DataType,
    element: &str,
    out: &mut Vec<u8>,
) -> Result<(), ZarrError> {
    match data_type {
        DataType::Ascii(n) => {
            let mut bytes: Vec<u8> = element
                .chars()
                .filter(char::is_ascii)
                .map(|c| c as u8)
                .take(*n)
                .collect();
            bytes.resize(*n, 0);
            out.extend(bytes);
            Ok(())
        }
        DataType::Unicode(n) => {
            let mut units: Vec<u32> = element.chars().map(|c| c as u32).take(*n).collect();
            units.resize(*n, 0);
            for unit in units {
                out.extend(unit.to_ne_bytes());
            }
            Ok(())
        }
        other => Err(ZarrError::invalid_argument(format!(
            "{other} is not a string data type"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversion_clamps() {
        let mut out = [0u8; 1];
        convert_element(
            &DataType::Int32,
            &300i32.to_ne_bytes(),
            &DataType::UInt8,
            &mut out,
        );
        assert_eq!(out[0], 255);

        convert_element(
            &DataType::Float64,
            &(-1.2f64).to_ne_bytes(),
            &DataType::UInt8,
            &mut out,
        );
        assert_eq!(out[0], 0);

        let mut out = [0u8; 4];
        convert_element(
            &DataType::Float64,
            &1.5f64.to_ne_bytes(),
            &DataType::Float32,
            &mut out,
        );
        assert_eq!(f32::from_ne_bytes(out), 1.5);
    }

    #[test]
    fn scalar_conversion_complex_to_real() {
        let mut src = Vec::new();
        src.extend(3.5f64.to_ne_bytes());
        src.extend(7.0f64.to_ne_bytes());
        let mut out = [0u8; 8];
        convert_element(&DataType::Complex128, &src, &DataType::Float64, &mut out);
        assert_eq!(f64::from_ne_bytes(out), 3.5);
    }

    #[test]
    fn convertibility_matrix() {
        assert!(convertible(&DataType::Int16, &DataType::Float64));
        assert!(convertible(&DataType::Complex64, &DataType::Int32));
        assert!(convertible(&DataType::Ascii(4), &DataType::Ascii(4)));
        assert!(!convertible(&DataType::Ascii(4), &DataType::Ascii(5)));
        assert!(!convertible(&DataType::Ascii(4), &DataType::Int32));
        assert!(!convertible(&DataType::Unicode(2), &DataType::Ascii(2)));
    }

    #[test]
    fn contiguous_strides_row_major() {
        assert_eq!(contiguous_strides(&[2, 3, 4]), vec![12, 4, 1]);
        assert_eq!(contiguous_strides(&[5]), vec![1]);
    }
}
