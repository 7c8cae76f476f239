//! Runtime backed by the TensorFlow C API (`libtensorflow`)
//!
//! The shared library is opened at run time with `libloading`, so building
//! this crate does not require TensorFlow to be installed.

use std::collections::HashMap;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::rc::Rc;
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, trace};

use crate::buffer::{Buffer, BufferAllocator};
use crate::config::LibraryConfig;
use crate::error::{GraphError, StatusCode};
use crate::ffi::{self, TF_Buffer, TF_TString, TF_TSTRING_SIZE};
use crate::graph::{DataType, Operation, Output};
use crate::runtime::{Graph, Runtime, Session, SessionOptions};
use crate::tensor::{Tensor, TensorData};

/// Resolved C API entry points of one loaded `libtensorflow`
pub struct NativeLibrary {
    path: PathBuf,
    version: ffi::TF_VersionFn,
    new_buffer: ffi::TF_NewBufferFn,
    delete_buffer: ffi::TF_DeleteBufferFn,
    new_status: ffi::TF_NewStatusFn,
    delete_status: ffi::TF_DeleteStatusFn,
    get_code: ffi::TF_GetCodeFn,
    message: ffi::TF_MessageFn,
    new_session_options: ffi::TF_NewSessionOptionsFn,
    delete_session_options: ffi::TF_DeleteSessionOptionsFn,
    set_target: ffi::TF_SetTargetFn,
    set_config: ffi::TF_SetConfigFn,
    new_graph: ffi::TF_NewGraphFn,
    delete_graph: ffi::TF_DeleteGraphFn,
    graph_operation_by_name: ffi::TF_GraphOperationByNameFn,
    graph_next_operation: ffi::TF_GraphNextOperationFn,
    operation_name: ffi::TF_OperationNameFn,
    operation_op_type: ffi::TF_OperationOpTypeFn,
    operation_num_outputs: ffi::TF_OperationNumOutputsFn,
    load_session_from_saved_model: ffi::TF_LoadSessionFromSavedModelFn,
    session_run: ffi::TF_SessionRunFn,
    close_session: ffi::TF_CloseSessionFn,
    delete_session: ffi::TF_DeleteSessionFn,
    allocate_tensor: ffi::TF_AllocateTensorFn,
    delete_tensor: ffi::TF_DeleteTensorFn,
    tensor_type: ffi::TF_TensorTypeFn,
    num_dims: ffi::TF_NumDimsFn,
    dim: ffi::TF_DimFn,
    tensor_byte_size: ffi::TF_TensorByteSizeFn,
    tensor_data: ffi::TF_TensorDataFn,
    string_init: ffi::TF_StringInitFn,
    string_copy: ffi::TF_StringCopyFn,
    string_get_data_pointer: ffi::TF_StringGetDataPointerFn,
    string_get_size: ffi::TF_StringGetSizeFn,
    string_dealloc: ffi::TF_StringDeallocFn,
    // Must outlive every function pointer above.
    _library: Library,
}

/// # Safety
///
/// `T` must be the function pointer type of the C symbol `name`.
unsafe fn symbol<T: Copy>(library: &Library, name: &'static str) -> Result<T, GraphError> {
    let symbol = library
        .get::<T>(name.as_bytes())
        .map_err(|source| GraphError::MissingSymbol {
            symbol: name,
            source,
        })?;
    Ok(*symbol)
}

impl NativeLibrary {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let path = path.as_ref().to_path_buf();

        // SAFETY: loading runs the library's initializers; the caller chose
        // the path.
        let library = unsafe { Library::new(&path) }.map_err(|source| GraphError::LibraryLoad {
            path: path.clone(),
            source,
        })?;

        // SAFETY: each type alias in `ffi` mirrors the C API declaration.
        unsafe {
            Ok(Self {
                version: symbol(&library, "TF_Version")?,
                new_buffer: symbol(&library, "TF_NewBuffer")?,
                delete_buffer: symbol(&library, "TF_DeleteBuffer")?,
                new_status: symbol(&library, "TF_NewStatus")?,
                delete_status: symbol(&library, "TF_DeleteStatus")?,
                get_code: symbol(&library, "TF_GetCode")?,
                message: symbol(&library, "TF_Message")?,
                new_session_options: symbol(&library, "TF_NewSessionOptions")?,
                delete_session_options: symbol(&library, "TF_DeleteSessionOptions")?,
                set_target: symbol(&library, "TF_SetTarget")?,
                set_config: symbol(&library, "TF_SetConfig")?,
                new_graph: symbol(&library, "TF_NewGraph")?,
                delete_graph: symbol(&library, "TF_DeleteGraph")?,
                graph_operation_by_name: symbol(&library, "TF_GraphOperationByName")?,
                graph_next_operation: symbol(&library, "TF_GraphNextOperation")?,
                operation_name: symbol(&library, "TF_OperationName")?,
                operation_op_type: symbol(&library, "TF_OperationOpType")?,
                operation_num_outputs: symbol(&library, "TF_OperationNumOutputs")?,
                load_session_from_saved_model: symbol(&library, "TF_LoadSessionFromSavedModel")?,
                session_run: symbol(&library, "TF_SessionRun")?,
                close_session: symbol(&library, "TF_CloseSession")?,
                delete_session: symbol(&library, "TF_DeleteSession")?,
                allocate_tensor: symbol(&library, "TF_AllocateTensor")?,
                delete_tensor: symbol(&library, "TF_DeleteTensor")?,
                tensor_type: symbol(&library, "TF_TensorType")?,
                num_dims: symbol(&library, "TF_NumDims")?,
                dim: symbol(&library, "TF_Dim")?,
                tensor_byte_size: symbol(&library, "TF_TensorByteSize")?,
                tensor_data: symbol(&library, "TF_TensorData")?,
                string_init: symbol(&library, "TF_StringInit")?,
                string_copy: symbol(&library, "TF_StringCopy")?,
                string_get_data_pointer: symbol(&library, "TF_StringGetDataPointer")?,
                string_get_size: symbol(&library, "TF_StringGetSize")?,
                string_dealloc: symbol(&library, "TF_StringDealloc")?,
                path,
                _library: library,
            })
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Version string reported by `TF_Version`
    pub fn version(&self) -> String {
        unsafe { cstr_to_string((self.version)()) }
    }
}

impl std::fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

unsafe fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

fn c_string(value: &str) -> Result<CString, GraphError> {
    CString::new(value).map_err(|_| GraphError::InvalidPath {
        value: value.to_string(),
        reason: "contains an interior NUL byte".to_string(),
    })
}

fn null_handle(call: &str) -> GraphError {
    GraphError::Native {
        code: StatusCode::ResourceExhausted,
        message: format!("{call} returned null"),
    }
}

/// Owned `TF_Status`
struct Status<'a> {
    lib: &'a NativeLibrary,
    raw: NonNull<ffi::TF_Status>,
}

impl<'a> Status<'a> {
    fn new(lib: &'a NativeLibrary) -> Result<Self, GraphError> {
        let raw = NonNull::new(unsafe { (lib.new_status)() }).ok_or_else(|| null_handle("TF_NewStatus"))?;
        Ok(Self { lib, raw })
    }

    fn as_ptr(&self) -> *mut ffi::TF_Status {
        self.raw.as_ptr()
    }

    fn check(&self) -> Result<(), GraphError> {
        let code = StatusCode::from_code(unsafe { (self.lib.get_code)(self.as_ptr()) });
        if code == StatusCode::Ok {
            return Ok(());
        }
        let message = unsafe { cstr_to_string((self.lib.message)(self.as_ptr())) };
        Err(GraphError::Native { code, message })
    }
}

impl Drop for Status<'_> {
    fn drop(&mut self) {
        unsafe { (self.lib.delete_status)(self.as_ptr()) }
    }
}

/// Owned `TF_SessionOptions`
struct NativeSessionOptions<'a> {
    lib: &'a NativeLibrary,
    raw: NonNull<ffi::TF_SessionOptions>,
}

impl<'a> NativeSessionOptions<'a> {
    fn new(lib: &'a NativeLibrary, options: &SessionOptions) -> Result<Self, GraphError> {
        let raw = NonNull::new(unsafe { (lib.new_session_options)() })
            .ok_or_else(|| null_handle("TF_NewSessionOptions"))?;
        let native = Self { lib, raw };

        if let Some(target) = &options.target {
            let target = c_string(target)?;
            // TF_SetTarget copies the string.
            unsafe { (lib.set_target)(raw.as_ptr(), target.as_ptr()) };
        }
        if !options.config.is_empty() {
            let status = Status::new(lib)?;
            unsafe {
                (lib.set_config)(
                    raw.as_ptr(),
                    options.config.as_ptr() as *const c_void,
                    options.config.len(),
                    status.as_ptr(),
                )
            };
            status.check()?;
        }
        Ok(native)
    }
}

impl Drop for NativeSessionOptions<'_> {
    fn drop(&mut self) {
        unsafe { (self.lib.delete_session_options)(self.raw.as_ptr()) }
    }
}

/// Owned `TF_Graph`, shared by the graph view and the session using it
struct GraphHandle {
    lib: Arc<NativeLibrary>,
    raw: NonNull<ffi::TF_Graph>,
}

impl GraphHandle {
    fn new(lib: Arc<NativeLibrary>) -> Result<Self, GraphError> {
        let raw = NonNull::new(unsafe { (lib.new_graph)() }).ok_or_else(|| null_handle("TF_NewGraph"))?;
        Ok(Self { lib, raw })
    }

    fn find(&self, name: &str) -> Option<NonNull<ffi::TF_Operation>> {
        let name = CString::new(name).ok()?;
        NonNull::new(unsafe { (self.lib.graph_operation_by_name)(self.raw.as_ptr(), name.as_ptr()) })
    }

    fn num_outputs(&self, oper: NonNull<ffi::TF_Operation>) -> usize {
        let count = unsafe { (self.lib.operation_num_outputs)(oper.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    fn describe(&self, oper: NonNull<ffi::TF_Operation>) -> Operation {
        unsafe {
            Operation {
                name: cstr_to_string((self.lib.operation_name)(oper.as_ptr())),
                op_type: cstr_to_string((self.lib.operation_op_type)(oper.as_ptr())),
                num_outputs: self.num_outputs(oper),
            }
        }
    }

    fn resolve(&self, output: &Output) -> Result<ffi::TF_Output, GraphError> {
        let oper = self
            .find(&output.operation)
            .ok_or_else(|| GraphError::OperationNotFound {
                name: output.operation.clone(),
            })?;
        let num_outputs = self.num_outputs(oper);
        if output.index >= num_outputs {
            return Err(GraphError::OutputOutOfRange {
                operation: output.operation.clone(),
                index: output.index,
                num_outputs,
            });
        }
        Ok(ffi::TF_Output {
            oper: oper.as_ptr(),
            // bounded by num_outputs, itself a c_int
            index: output.index as c_int,
        })
    }
}

impl Drop for GraphHandle {
    fn drop(&mut self) {
        unsafe { (self.lib.delete_graph)(self.raw.as_ptr()) }
    }
}

/// Owned `TF_Tensor`
struct NativeTensor<'a> {
    lib: &'a NativeLibrary,
    raw: NonNull<ffi::TF_Tensor>,
    // Leading `TF_TString` elements initialised here; `TF_DeleteTensor` does
    // not free their heap storage.
    strings: usize,
}

/// Free the heap storage of the first `count` strings at `data`
///
/// # Safety
///
/// `data` must point to at least `count` initialised `TF_TString`s.
unsafe fn dealloc_strings(dealloc: ffi::TF_StringDeallocFn, data: *mut c_void, count: usize) {
    let strings = data as *mut TF_TString;
    for i in 0..count {
        dealloc(strings.add(i));
    }
}

unsafe fn write_values<T: Copy>(values: &[T], dst: *mut c_void) {
    ptr::copy_nonoverlapping(values.as_ptr(), dst as *mut T, values.len());
}

unsafe fn read_values<T: Copy>(src: *const c_void, count: usize) -> Vec<T> {
    if count == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(src as *const T, count).to_vec()
}

impl<'a> NativeTensor<'a> {
    /// Copy a host tensor into a newly allocated native tensor
    fn from_tensor(lib: &'a NativeLibrary, tensor: &Tensor) -> Result<Self, GraphError> {
        let dims: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let count = tensor.element_count();
        let width = tensor
            .dtype()
            .bytes_per_element()
            .unwrap_or(TF_TSTRING_SIZE);
        let byte_len = count * width;

        let raw = unsafe {
            (lib.allocate_tensor)(
                tensor.dtype().code(),
                dims.as_ptr(),
                dims.len() as c_int,
                byte_len,
            )
        };
        let raw = NonNull::new(raw).ok_or(GraphError::TensorAllocationFailed { byte_len })?;
        let mut native = Self {
            lib,
            raw,
            strings: 0,
        };
        if count == 0 {
            return Ok(native);
        }

        let data = unsafe { (lib.tensor_data)(raw.as_ptr()) };
        if data.is_null() {
            return Err(GraphError::TensorAllocationFailed { byte_len });
        }
        unsafe {
            match tensor.data() {
                TensorData::Float32(v) => write_values(v, data),
                TensorData::Float64(v) => write_values(v, data),
                TensorData::Int32(v) => write_values(v, data),
                TensorData::Uint8(v) => write_values(v, data),
                TensorData::Int8(v) => write_values(v, data),
                TensorData::Int64(v) => write_values(v, data),
                TensorData::Bool(v) => {
                    let bytes: Vec<u8> = v.iter().map(|&b| b as u8).collect();
                    write_values(&bytes, data)
                }
                TensorData::String(v) => {
                    let strings = data as *mut TF_TString;
                    for (i, value) in v.iter().enumerate() {
                        let dst = strings.add(i);
                        (lib.string_init)(dst);
                        native.strings += 1;
                        (lib.string_copy)(dst, value.as_ptr() as *const c_char, value.len());
                    }
                }
            }
        }
        Ok(native)
    }

    /// Copy the native tensor out into host memory
    fn to_tensor(&self) -> Result<Tensor, GraphError> {
        let lib = self.lib;
        let raw = self.raw.as_ptr();

        let dtype = DataType::from_code(unsafe { (lib.tensor_type)(raw) })?;
        let num_dims = unsafe { (lib.num_dims)(raw) };
        let shape: Vec<usize> = (0..num_dims)
            .map(|i| usize::try_from(unsafe { (lib.dim)(raw, i) }).unwrap_or(0))
            .collect();
        let count: usize = shape.iter().product();

        let expected = count * dtype.bytes_per_element().unwrap_or(TF_TSTRING_SIZE);
        let byte_size = unsafe { (lib.tensor_byte_size)(raw) };
        let data = unsafe { (lib.tensor_data)(raw) } as *const c_void;
        if byte_size < expected || (count > 0 && data.is_null()) {
            return Err(GraphError::Native {
                code: StatusCode::Internal,
                message: format!(
                    "fetched {dtype:?} tensor of shape {shape:?} holds {byte_size} bytes, expected {expected}"
                ),
            });
        }

        let values = unsafe {
            match dtype {
                DataType::Float32 => TensorData::Float32(read_values(data, count)),
                DataType::Float64 => TensorData::Float64(read_values(data, count)),
                DataType::Int32 => TensorData::Int32(read_values(data, count)),
                DataType::Uint8 => TensorData::Uint8(read_values(data, count)),
                DataType::Int8 => TensorData::Int8(read_values(data, count)),
                DataType::Int64 => TensorData::Int64(read_values(data, count)),
                DataType::Bool => TensorData::Bool(
                    read_values::<u8>(data, count)
                        .into_iter()
                        .map(|b| b != 0)
                        .collect(),
                ),
                DataType::String => {
                    let strings = data as *const TF_TString;
                    TensorData::String(
                        (0..count)
                            .map(|i| {
                                let s = strings.add(i);
                                let len = (lib.string_get_size)(s);
                                read_values::<u8>((lib.string_get_data_pointer)(s) as *const c_void, len)
                            })
                            .collect(),
                    )
                }
            }
        };
        Tensor::new(shape, values)
    }
}

impl Drop for NativeTensor<'_> {
    fn drop(&mut self) {
        unsafe {
            if self.strings > 0 {
                let data = (self.lib.tensor_data)(self.raw.as_ptr());
                dealloc_strings(self.lib.string_dealloc, data, self.strings);
            }
            (self.lib.delete_tensor)(self.raw.as_ptr())
        }
    }
}

/// A graph loaded into the native runtime
pub struct NativeGraph {
    inner: Rc<GraphHandle>,
}

impl Graph for NativeGraph {
    fn operation(&self, name: &str) -> Option<Operation> {
        self.inner.find(name).map(|oper| self.inner.describe(oper))
    }

    fn operations(&self) -> Vec<Operation> {
        let mut operations = Vec::new();
        let mut pos = 0usize;
        while let Some(oper) =
            NonNull::new(unsafe { (self.inner.lib.graph_next_operation)(self.inner.raw.as_ptr(), &mut pos) })
        {
            operations.push(self.inner.describe(oper));
        }
        operations
    }
}

/// A native session; closed and deleted on drop, before its graph
pub struct NativeSession {
    graph: Rc<GraphHandle>,
    raw: Option<NonNull<ffi::TF_Session>>,
}

impl Session for NativeSession {
    fn run(
        &mut self,
        feeds: &HashMap<Output, Tensor>,
        fetches: &[Output],
    ) -> Result<Vec<Tensor>, GraphError> {
        let session = self.raw.ok_or_else(|| GraphError::Native {
            code: StatusCode::FailedPrecondition,
            message: "session has been closed".to_string(),
        })?;
        let lib = &*self.graph.lib;

        let mut inputs = Vec::with_capacity(feeds.len());
        let mut input_tensors = Vec::with_capacity(feeds.len());
        for (output, tensor) in feeds {
            inputs.push(self.graph.resolve(output)?);
            input_tensors.push(NativeTensor::from_tensor(lib, tensor)?);
        }
        let input_values: Vec<*mut ffi::TF_Tensor> =
            input_tensors.iter().map(|t| t.raw.as_ptr()).collect();
        let outputs = fetches
            .iter()
            .map(|fetch| self.graph.resolve(fetch))
            .collect::<Result<Vec<_>, _>>()?;
        let mut output_values: Vec<*mut ffi::TF_Tensor> = vec![ptr::null_mut(); outputs.len()];

        trace!(feeds = inputs.len(), fetches = outputs.len(), "running session");
        let status = Status::new(lib)?;
        unsafe {
            (lib.session_run)(
                session.as_ptr(),
                ptr::null(),
                inputs.as_ptr(),
                input_values.as_ptr(),
                inputs.len() as c_int,
                outputs.as_ptr(),
                output_values.as_mut_ptr(),
                outputs.len() as c_int,
                ptr::null(),
                0,
                ptr::null_mut(),
                status.as_ptr(),
            )
        };
        // Take ownership before checking the status so nothing leaks.
        let fetched: Vec<Option<NativeTensor<'_>>> = output_values
            .into_iter()
            .map(|raw| {
                // Fetched tensors own their strings; `TF_DeleteTensor` frees them.
                NonNull::new(raw).map(|raw| NativeTensor {
                    lib,
                    raw,
                    strings: 0,
                })
            })
            .collect();
        status.check()?;

        fetched
            .into_iter()
            .zip(fetches)
            .map(|(tensor, fetch)| -> Result<Tensor, GraphError> {
                tensor
                    .ok_or_else(|| GraphError::Native {
                        code: StatusCode::Internal,
                        message: format!("no tensor returned for `{fetch}`"),
                    })?
                    .to_tensor()
            })
            .collect()
    }

    fn close(&mut self) -> Result<(), GraphError> {
        let Some(raw) = self.raw.take() else {
            return Ok(());
        };
        let lib = &*self.graph.lib;
        let status = Status::new(lib)?;
        unsafe { (lib.close_session)(raw.as_ptr(), status.as_ptr()) };
        let closed = status.check();
        unsafe { (lib.delete_session)(raw.as_ptr(), status.as_ptr()) };
        closed.and(status.check())
    }
}

impl Drop for NativeSession {
    fn drop(&mut self) {
        // Nothing to report to from here; call `close` to observe failures.
        let _ = self.close();
    }
}

/// [`Runtime`] over a dynamically loaded `libtensorflow`
#[derive(Clone)]
pub struct NativeRuntime {
    lib: Arc<NativeLibrary>,
}

impl NativeRuntime {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let lib = NativeLibrary::open(path)?;
        debug!(path = %lib.path().display(), version = %lib.version(), "opened libtensorflow");
        Ok(Self { lib: Arc::new(lib) })
    }

    /// Open the library by its platform name (`libtensorflow.so`,
    /// `libtensorflow.dylib`, `tensorflow.dll`) on the loader's search path
    pub fn open_default() -> Result<Self, GraphError> {
        Self::open(libloading::library_filename("tensorflow"))
    }

    pub fn from_config(config: &LibraryConfig) -> Result<Self, GraphError> {
        match &config.path {
            Some(path) => Self::open(path),
            None => Self::open_default(),
        }
    }

    pub fn library(&self) -> &NativeLibrary {
        &self.lib
    }

    pub fn version(&self) -> String {
        self.lib.version()
    }
}

impl std::fmt::Debug for NativeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeRuntime")
            .field("library", &self.lib)
            .finish()
    }
}

// SAFETY: `TF_NewBuffer` returns an initialised, caller-owned buffer that
// stays valid until `TF_DeleteBuffer`.
unsafe impl BufferAllocator for NativeRuntime {
    fn allocate_buffer(&self) -> Result<NonNull<TF_Buffer>, GraphError> {
        NonNull::new(unsafe { (self.lib.new_buffer)() }).ok_or(GraphError::BufferAllocationFailed)
    }

    unsafe fn release_buffer(&self, buffer: NonNull<TF_Buffer>) {
        (self.lib.delete_buffer)(buffer.as_ptr())
    }
}

impl Runtime for NativeRuntime {
    type Graph = NativeGraph;
    type Session = NativeSession;

    fn load_saved_model(
        &self,
        export_dir: &Path,
        tags: &[&str],
        options: &SessionOptions,
        meta_graph: &mut Buffer<'_, Self>,
    ) -> Result<(NativeGraph, NativeSession), GraphError> {
        let lib = &*self.lib;
        let dir = export_dir.to_str().ok_or_else(|| GraphError::InvalidPath {
            value: export_dir.display().to_string(),
            reason: "not valid UTF-8".to_string(),
        })?;
        let dir = c_string(dir)?;
        let tags = tags
            .iter()
            .map(|tag| c_string(tag))
            .collect::<Result<Vec<_>, _>>()?;
        let tag_ptrs: Vec<*const c_char> = tags.iter().map(|tag| tag.as_ptr()).collect();

        let session_options = NativeSessionOptions::new(lib, options)?;
        let graph = Rc::new(GraphHandle::new(Arc::clone(&self.lib))?);
        let status = Status::new(lib)?;
        let session = unsafe {
            (lib.load_session_from_saved_model)(
                session_options.raw.as_ptr(),
                ptr::null(),
                dir.as_ptr(),
                tag_ptrs.as_ptr(),
                tag_ptrs.len() as c_int,
                graph.raw.as_ptr(),
                meta_graph.as_mut_ptr(),
                status.as_ptr(),
            )
        };
        status.check()?;
        let session = NonNull::new(session).ok_or_else(|| null_handle("TF_LoadSessionFromSavedModel"))?;

        Ok((
            NativeGraph {
                inner: Rc::clone(&graph),
            },
            NativeSession {
                graph,
                raw: Some(session),
            },
        ))
    }
}
