use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use parking_lot::{Mutex, RwLock};

/// Access-control bits carried in a record's mask.
pub mod mask {
    pub const READONLY: u32 = 1 << 0;
    pub const CONF: u32 = 1 << 1;
    pub const TELEM: u32 = 1 << 2;
    pub const HWREG: u32 = 1 << 3;
    pub const ERRCNT: u32 = 1 << 4;
    pub const SYSINFO: u32 = 1 << 5;
    pub const SYSCONF: u32 = 1 << 6;
    pub const WDT: u32 = 1 << 7;
    pub const DEBUG: u32 = 1 << 8;
    pub const CALIB: u32 = 1 << 9;
    pub const ATOMIC_WRITE: u32 = 1 << 10;
}

/// Value type tag of a native record.
///
/// The `Xint*` variants are hexadecimal-flavored unsigned integers: they
/// share storage with their `Uint*` counterparts but accept and render
/// hexadecimal text on the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ParamType {
    #[strum(serialize = "uint8")]
    Uint8,
    #[strum(serialize = "uint16")]
    Uint16,
    #[strum(serialize = "uint32")]
    Uint32,
    #[strum(serialize = "uint64")]
    Uint64,
    #[strum(serialize = "int8")]
    Int8,
    #[strum(serialize = "int16")]
    Int16,
    #[strum(serialize = "int32")]
    Int32,
    #[strum(serialize = "int64")]
    Int64,
    #[strum(serialize = "xint8")]
    Xint8,
    #[strum(serialize = "xint16")]
    Xint16,
    #[strum(serialize = "xint32")]
    Xint32,
    #[strum(serialize = "xint64")]
    Xint64,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "double")]
    Double,
    #[strum(serialize = "string")]
    String,
    #[strum(serialize = "data")]
    Data,
}

impl ParamType {
    /// Storage bytes per array element.
    pub fn elem_size(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 | Self::Xint8 | Self::String | Self::Data => 1,
            Self::Uint16 | Self::Int16 | Self::Xint16 => 2,
            Self::Uint32 | Self::Int32 | Self::Xint32 | Self::Float => 4,
            Self::Uint64 | Self::Int64 | Self::Xint64 | Self::Double => 8,
        }
    }

    pub fn is_hex(self) -> bool {
        matches!(self, Self::Xint8 | Self::Xint16 | Self::Xint32 | Self::Xint64)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Float | Self::Double)
    }
}

/// Where a record's storage ultimately lives on the native side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
pub enum StoreKind {
    #[strum(serialize = "ram")]
    Ram,
    #[strum(serialize = "fram")]
    Fram,
    #[strum(serialize = "flash")]
    Flash,
    #[strum(serialize = "file")]
    File,
    #[strum(serialize = "driver")]
    Driver,
}

/// Backing store descriptor of a record, when it has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub kind: StoreKind,
}

/// Opaque identity key of a native record: its address.
pub type RecordKey = usize;

/// Hook installed on a record, fired when its value changes through the
/// native path. Receives the changed offset, -1 for a whole-array change.
pub(crate) type ChangeHook = Arc<dyn Fn(i32) + Send + Sync>;

/// One native parameter record.
///
/// Identified by `(node, id)`. Owns a raw little-endian value buffer of
/// `array_size * elem_size` bytes. The record itself carries no ownership
/// semantics; who releases it is decided by the wrapper that holds it.
pub struct ParamRecord {
    node: u16,
    id: u16,
    name: String,
    param_type: ParamType,
    array_size: usize,
    mask: u32,
    unit: Option<String>,
    docstr: Option<String>,
    store: Option<StoreDescriptor>,
    storage: Mutex<Vec<u8>>,
    timestamp: Mutex<Option<SystemTime>>,
    hook: RwLock<Option<ChangeHook>>,
    released: AtomicBool,
}

impl std::fmt::Debug for ParamRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamRecord")
            .field("node", &self.node)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("param_type", &self.param_type)
            .field("array_size", &self.array_size)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
impl ParamRecord {
    pub fn new(
        node: u16,
        id: u16,
        name: impl Into<String>,
        param_type: ParamType,
        array_size: usize,
        mask: u32,
        unit: Option<String>,
        docstr: Option<String>,
        store: Option<StoreDescriptor>,
    ) -> Self {
        let array_size = array_size.max(1);
        Self {
            node,
            id,
            name: name.into(),
            param_type,
            array_size,
            mask,
            unit,
            docstr,
            store,
            storage: Mutex::new(vec![0; array_size * param_type.elem_size()]),
            timestamp: Mutex::new(None),
            hook: RwLock::new(None),
            released: AtomicBool::new(false),
        }
    }

    pub fn node(&self) -> u16 {
        self.node
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_type(&self) -> ParamType {
        self.param_type
    }

    pub fn array_size(&self) -> usize {
        self.array_size
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn docstr(&self) -> Option<&str> {
        self.docstr.as_deref()
    }

    pub fn store(&self) -> Option<StoreDescriptor> {
        self.store
    }

    pub fn timestamp(&self) -> Option<SystemTime> {
        *self.timestamp.lock()
    }

    pub fn touch(&self) {
        *self.timestamp.lock() = Some(SystemTime::now());
    }

    /// Identity key: the record's address.
    pub fn key(self: &Arc<Self>) -> RecordKey {
        Arc::as_ptr(self) as RecordKey
    }

    /// Copy of one element's storage bytes.
    pub fn read_elem(&self, offset: usize) -> Vec<u8> {
        let size = self.param_type.elem_size();
        let storage = self.storage.lock();
        storage[offset * size..(offset + 1) * size].to_vec()
    }

    /// Copy of the whole storage buffer.
    pub fn read_all(&self) -> Vec<u8> {
        self.storage.lock().clone()
    }

    /// Write one element's storage bytes. `bytes` must be exactly one
    /// element wide.
    pub fn write_elem(&self, offset: usize, bytes: &[u8]) {
        let size = self.param_type.elem_size();
        debug_assert_eq!(bytes.len(), size);
        let mut storage = self.storage.lock();
        storage[offset * size..(offset + 1) * size].copy_from_slice(bytes);
    }

    /// Replace the whole storage buffer, zero-padding short input.
    pub fn write_all(&self, bytes: &[u8]) {
        let mut storage = self.storage.lock();
        let len = storage.len();
        storage.fill(0);
        let n = bytes.len().min(len);
        storage[..n].copy_from_slice(&bytes[..n]);
    }

    /// String records: the value up to the first NUL terminator.
    pub fn string_value(&self) -> String {
        let storage = self.storage.lock();
        let end = storage.iter().position(|&b| b == 0).unwrap_or(storage.len());
        String::from_utf8_lossy(&storage[..end]).into_owned()
    }

    pub(crate) fn set_hook(&self, hook: ChangeHook) {
        *self.hook.write() = Some(hook);
    }

    pub(crate) fn clear_hook(&self) {
        *self.hook.write() = None;
    }

    /// Fire the installed change hook, if any. Called by the native side
    /// (registry / transport reply application) after mutating storage.
    pub fn notify_change(&self, offset: i32) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(offset);
        }
    }

    /// Mark the record's memory released. Releasing twice is the native
    /// allocator's double-free and aborts loudly.
    pub fn mark_released(&self) {
        let already = self.released.swap(true, Ordering::AcqRel);
        assert!(
            !already,
            "record '{}'@{} released twice",
            self.name, self.node
        );
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}
