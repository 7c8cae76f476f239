//! Exclusive ownership of native `TF_Buffer` handles
//!
//! A [`Buffer`] owns one native buffer from construction until it is
//! released. The raw handle never leaves this crate: callers see the contents
//! only through the bounds-checked [`Buffer::bytes`] view or a decoded message.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr::NonNull;

use prost::Message;
use tracing::trace;

use crate::error::GraphError;
use crate::ffi::TF_Buffer;
use crate::protos::tensorflow::MetaGraphDef;

/// Largest buffer [`Buffer::bytes`] will expose (2^30 bytes)
pub const MAX_DECODE_LEN: usize = 1 << 30;

/// Allocates and frees native buffers.
///
/// Implemented by every runtime; [`HostAllocator`] serves in-process use.
///
/// # Safety
///
/// [`Buffer`] dereferences every handle this trait hands out. An
/// implementation must return from `allocate_buffer` a pointer to a live,
/// properly initialised `TF_Buffer` that is exclusively owned by the caller
/// and stays valid until it is passed to `release_buffer`. A non-null `data`
/// must point to `length` readable bytes.
///
/// Implementing the trait therefore requires `unsafe impl`:
///
/// ```compile_fail
/// use std::ptr::NonNull;
/// use tfbind::ffi::TF_Buffer;
/// use tfbind::{BufferAllocator, GraphError};
///
/// struct Dangling;
///
/// impl BufferAllocator for Dangling {
///     fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
///         Ok(NonNull::dangling())
///     }
///
///     unsafe fn release_buffer(&self, _buffer: NonNull<TF_Buffer>) {}
/// }
/// ```
pub unsafe trait BufferAllocator {
    /// Allocate an empty buffer (`data` null, `length` 0).
    fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError>;

    /// Free a buffer and, through its `data_deallocator`, its contents.
    ///
    /// # Safety
    ///
    /// `buffer` must have come from `allocate_buffer` on this allocator and
    /// must not be used again.
    unsafe fn release_buffer(&self, buffer: NonNull<TF_Buffer>);
}

/// Allocates `TF_Buffer`s on the Rust heap with `TF_DeleteBuffer` semantics.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostAllocator;

// SAFETY: buffers are boxed, initialised empty and freed only in
// `release_buffer`.
unsafe impl BufferAllocator for HostAllocator {
    fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
        Ok(NonNull::from(Box::leak(Box::new(TF_Buffer::empty()))))
    }

    unsafe fn release_buffer(&self, buffer: NonNull<TF_Buffer>) {
        let buffer = Box::from_raw(buffer.as_ptr());
        if let Some(deallocator) = buffer.data_deallocator {
            deallocator(buffer.data as *mut c_void, buffer.length);
        }
    }
}

/// Frees contents installed by [`Buffer::fill`].
unsafe extern "C" fn free_boxed_bytes(data: *mut c_void, length: usize) {
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        data as *mut u8,
        length,
    )));
}

/// A native buffer owned by exactly one value.
///
/// Not `Clone`; moving it transfers ownership. [`Buffer::release`] frees it
/// explicitly and dropping it frees it otherwise, so the native handle is
/// released exactly once.
pub struct Buffer<'a, A: BufferAllocator + ?Sized> {
    allocator: &'a A,
    raw: NonNull<TF_Buffer>,
    // Raw handles are single-threaded.
    _not_send: PhantomData<*mut TF_Buffer>,
}

impl<'a, A: BufferAllocator + ?Sized> Buffer<'a, A> {
    /// Allocate a new, empty buffer
    pub fn new(allocator: &'a A) -> Result<Self, GraphError> {
        let raw = allocator.allocate_buffer()?;
        Ok(Self {
            allocator,
            raw,
            _not_send: PhantomData,
        })
    }

    fn raw(&self) -> &TF_Buffer {
        // SAFETY: `raw` is live until `self` is dropped.
        unsafe { self.raw.as_ref() }
    }

    /// Length reported by the native buffer
    pub fn len(&self) -> usize {
        self.raw().length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the contents with `bytes`, freeing any previous contents
    pub fn fill(&mut self, bytes: Vec<u8>) {
        // SAFETY: exclusive access through `&mut self`.
        let raw = unsafe { self.raw.as_mut() };
        if let Some(deallocator) = raw.data_deallocator.take() {
            unsafe { deallocator(raw.data as *mut c_void, raw.length) };
        }
        let length = bytes.len();
        let bytes = Box::into_raw(bytes.into_boxed_slice());
        raw.length = length;
        raw.data = bytes as *mut u8 as *const c_void;
        raw.data_deallocator = Some(free_boxed_bytes);
    }

    /// Borrow the contents.
    ///
    /// Fails without touching `data` if the reported length exceeds
    /// [`MAX_DECODE_LEN`], or if `data` is null for a non-empty buffer.
    pub fn bytes(&self) -> Result<&[u8], GraphError> {
        let raw = self.raw();
        let length = raw.length;
        if length > MAX_DECODE_LEN {
            return Err(GraphError::OversizedPayload {
                length,
                limit: MAX_DECODE_LEN,
            });
        }
        if length == 0 {
            return Ok(&[]);
        }
        if raw.data.is_null() {
            return Err(GraphError::NullBufferData { length });
        }
        // SAFETY: the owner of the contents guarantees `length` readable bytes
        // at `data`; they stay valid while `self` is borrowed.
        Ok(unsafe { std::slice::from_raw_parts(raw.data as *const u8, length) })
    }

    /// Decode the contents as a protocol buffer message
    pub fn decode<M: Message + Default>(&self) -> Result<M, GraphError> {
        Ok(M::decode(self.bytes()?)?)
    }

    pub fn decode_meta_graph(&self) -> Result<MetaGraphDef, GraphError> {
        self.decode()
    }

    /// Handle for native calls that populate the buffer
    pub(crate) fn as_mut_ptr(&mut self) -> *mut TF_Buffer {
        self.raw.as_ptr()
    }

    /// Free the native buffer now
    pub fn release(self) {
        drop(self)
    }
}

impl<A: BufferAllocator + ?Sized> Drop for Buffer<'_, A> {
    fn drop(&mut self) {
        trace!(length = self.raw().length, "releasing native buffer");
        // SAFETY: allocated by `self.allocator` and never handed out.
        unsafe { self.allocator.release_buffer(self.raw) };
    }
}

impl<A: BufferAllocator + ?Sized> std::fmt::Debug for Buffer<'_, A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer").field("length", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::tensorflow::meta_graph_def::MetaInfoDef;
    use crate::protos::tensorflow::{
        tensor_info, tensor_shape_proto, SignatureDef, TensorInfo, TensorShapeProto,
    };
    use proptest::prelude::*;
    use std::cell::Cell;

    /// Counts allocations and releases on top of [`HostAllocator`]
    #[derive(Default)]
    struct CountingAllocator {
        allocated: Cell<usize>,
        released: Cell<usize>,
    }

    unsafe impl BufferAllocator for CountingAllocator {
        fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
            self.allocated.set(self.allocated.get() + 1);
            HostAllocator.allocate_buffer()
        }

        unsafe fn release_buffer(&self, buffer: NonNull<TF_Buffer>) {
            self.released.set(self.released.get() + 1);
            HostAllocator.release_buffer(buffer)
        }
    }

    struct FailingAllocator;

    unsafe impl BufferAllocator for FailingAllocator {
        fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
            Err(GraphError::BufferAllocationFailed)
        }

        unsafe fn release_buffer(&self, _buffer: NonNull<TF_Buffer>) {
            unreachable!("nothing was allocated")
        }
    }

    fn sample_meta_graph() -> MetaGraphDef {
        let tensor = |name: &str| TensorInfo {
            dtype: 1,
            tensor_shape: None,
            encoding: Some(tensor_info::Encoding::Name(name.to_string())),
        };
        let mut signature = SignatureDef {
            method_name: "tensorflow/serving/regress".to_string(),
            ..Default::default()
        };
        signature
            .inputs
            .insert("inputs".to_string(), tensor("x_input_example_tensor:0"));
        signature.outputs.insert("outputs".to_string(), tensor("y:0"));

        let mut meta_graph = MetaGraphDef::default();
        meta_graph
            .signature_def
            .insert("regress_x_to_y".to_string(), signature);
        meta_graph
    }

    #[test]
    fn test_new_buffer_is_empty() {
        let buffer = Buffer::new(&HostAllocator).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(buffer.bytes().unwrap(), &[] as &[u8]);
        assert_eq!(buffer.decode_meta_graph().unwrap(), MetaGraphDef::default());
    }

    #[test]
    fn test_decode_round_trip() {
        let meta_graph = sample_meta_graph();
        let mut buffer = Buffer::new(&HostAllocator).unwrap();
        buffer.fill(meta_graph.encode_to_vec());

        let decoded = buffer.decode_meta_graph().unwrap();
        assert_eq!(decoded, meta_graph);
        // decoding leaves the buffer untouched
        assert_eq!(buffer.decode_meta_graph().unwrap(), meta_graph);
        buffer.release();
    }

    #[test]
    fn test_oversized_buffer_is_not_read() {
        let mut buffer = Buffer::new(&HostAllocator).unwrap();
        // A dangling pointer: any read would be undefined behaviour.
        unsafe {
            let raw = buffer.raw.as_mut();
            raw.data = NonNull::<u8>::dangling().as_ptr() as *const c_void;
            raw.length = MAX_DECODE_LEN + 1;
        }

        let err = buffer.decode_meta_graph().unwrap_err();
        assert!(matches!(
            err,
            GraphError::OversizedPayload {
                length,
                limit: MAX_DECODE_LEN,
            } if length == MAX_DECODE_LEN + 1
        ));

        unsafe {
            let raw = buffer.raw.as_mut();
            raw.data = std::ptr::null();
            raw.length = 0;
        }
    }

    #[test]
    fn test_null_data_with_length() {
        let mut buffer = Buffer::new(&HostAllocator).unwrap();
        unsafe { buffer.raw.as_mut().length = 16 };
        assert!(matches!(
            buffer.bytes(),
            Err(GraphError::NullBufferData { length: 16 })
        ));
        unsafe { buffer.raw.as_mut().length = 0 };
    }

    #[test]
    fn test_malformed_bytes_fail_to_decode() {
        let mut buffer = Buffer::new(&HostAllocator).unwrap();
        // field 5, length-delimited, claims 100 bytes but has 1
        buffer.fill(vec![0x2a, 0x64, 0x00]);
        assert!(matches!(
            buffer.decode_meta_graph(),
            Err(GraphError::Decode(_))
        ));
    }

    #[test]
    fn test_release_happens_exactly_once() {
        let allocator = CountingAllocator::default();
        {
            let mut buffer = Buffer::new(&allocator).unwrap();
            buffer.fill(vec![1, 2, 3]);
            buffer.fill(vec![4, 5]);
            assert_eq!(buffer.bytes().unwrap(), &[4, 5]);
            buffer.release();
        }
        {
            let _dropped = Buffer::new(&allocator).unwrap();
        }
        assert_eq!(allocator.allocated.get(), 2);
        assert_eq!(allocator.released.get(), 2);
    }

    #[test]
    fn test_allocation_failure_is_reported() {
        assert!(matches!(
            Buffer::new(&FailingAllocator),
            Err(GraphError::BufferAllocationFailed)
        ));
    }

    #[test]
    fn test_dyn_allocator() {
        let allocator: &dyn BufferAllocator = &HostAllocator;
        let mut buffer = Buffer::new(allocator).unwrap();
        buffer.fill(b"abc".to_vec());
        assert_eq!(buffer.len(), 3);
    }

    fn endpoint_name() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9_/]{0,12}", 0u32..8).prop_map(|(op, index)| format!("{op}:{index}"))
    }

    fn tensor_info_strategy() -> impl Strategy<Value = TensorInfo> {
        (
            endpoint_name(),
            0i32..24,
            proptest::option::of(proptest::collection::vec(-1i64..64, 0..4)),
        )
            .prop_map(|(name, dtype, dims)| TensorInfo {
                dtype,
                tensor_shape: dims.map(|dims| TensorShapeProto {
                    dim: dims
                        .into_iter()
                        .map(|size| tensor_shape_proto::Dim {
                            size,
                            name: String::new(),
                        })
                        .collect(),
                    unknown_rank: false,
                }),
                encoding: Some(tensor_info::Encoding::Name(name)),
            })
    }

    fn signature_strategy() -> impl Strategy<Value = SignatureDef> {
        let tensors =
            || proptest::collection::hash_map("[a-z_]{1,8}", tensor_info_strategy(), 0..4);
        (tensors(), tensors(), "[a-z/]{0,24}").prop_map(|(inputs, outputs, method_name)| {
            SignatureDef {
                inputs,
                outputs,
                method_name,
            }
        })
    }

    fn meta_graph_strategy() -> impl Strategy<Value = MetaGraphDef> {
        (
            proptest::collection::hash_map("[a-z_]{1,16}", signature_strategy(), 0..4),
            proptest::option::of(proptest::collection::vec("[a-z]{1,6}", 0..3)),
        )
            .prop_map(|(signature_def, tags)| MetaGraphDef {
                meta_info_def: tags.map(|tags| MetaInfoDef {
                    tags,
                    ..Default::default()
                }),
                signature_def,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn test_meta_graph_round_trip(meta_graph in meta_graph_strategy()) {
            let mut buffer = Buffer::new(&HostAllocator).unwrap();
            buffer.fill(meta_graph.encode_to_vec());
            prop_assert_eq!(buffer.decode_meta_graph().unwrap(), meta_graph.clone());
            // a second decode sees the same contents
            prop_assert_eq!(buffer.decode_meta_graph().unwrap(), meta_graph);
        }

        #[test]
        fn test_random_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let mut buffer = Buffer::new(&HostAllocator).unwrap();
            buffer.fill(bytes);
            match buffer.decode_meta_graph() {
                Ok(_) | Err(GraphError::Decode(_)) => {}
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
