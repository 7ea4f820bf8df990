//! Accelerator devices, buffer residency and kernel compilation.
//!
//! A [`Device`] is the backend that actually compiles kernels and moves
//! data. [`DeviceHandle`] adds the bookkeeping the decision procedure needs:
//! which host buffers have a device-side mirror, and whether the device's
//! kernels are compiled. [`DeviceSet`] holds one handle per accelerator class
//! and compiles the non-selected devices in the background.

use crate::ir::transfer::{DeviceClass, TransferType};
use crate::utils::errors::{RuntimeError, RuntimeErrorKind};
use crate::utils::intern::BufferId;
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Backend of one accelerator.
pub trait Device: Send + Sync {
    fn class(&self) -> DeviceClass;

    fn is_available(&self) -> bool {
        true
    }

    /// Compile every kernel for this device. Blocks until done.
    fn compile(&self) -> Result<(), RuntimeError>;

    /// Copy a device buffer back into host memory.
    fn read_back(&self, buffer: BufferId, info: &DeviceBuffer) -> Result<(), RuntimeError>;

    /// Release a device buffer.
    fn release(&self, _buffer: BufferId) {}
}

/// A device-side mirror of a host buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    pub transfer: TransferType,
    /// Number of elements
    pub size: i64,
    pub elem_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CompileState {
    NotCompiled,
    Compiling,
    Compiled,
    Failed(String),
}

/// Compilation status of one device, with a blocking wait.
#[derive(Debug)]
pub struct CompileGate {
    state: Mutex<CompileState>,
    done: Condvar,
}

impl Default for CompileGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileGate {
    pub fn new() -> Self {
        Self { state: Mutex::new(CompileState::NotCompiled), done: Condvar::new() }
    }

    /// Claim the compilation. Returns false if it is running or already finished.
    pub fn try_begin(&self) -> bool {
        let mut state = self.state.lock();
        if *state == CompileState::NotCompiled {
            *state = CompileState::Compiling;
            true
        } else {
            false
        }
    }

    pub fn finish(&self, result: &Result<(), RuntimeError>) {
        let mut state = self.state.lock();
        *state = match result {
            Ok(()) => CompileState::Compiled,
            Err(e) => CompileState::Failed(e.message.clone()),
        };
        self.done.notify_all();
    }

    pub fn is_compiled(&self) -> bool {
        *self.state.lock() == CompileState::Compiled
    }

    pub fn is_compiling(&self) -> bool {
        *self.state.lock() == CompileState::Compiling
    }

    /// Block while a compilation is in flight.
    ///
    /// Returns once the device is compiled, or immediately if nobody started
    /// compiling it. Fails if the compilation failed or `timeout` expires.
    pub fn wait(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while *state == CompileState::Compiling {
            if self.done.wait_until(&mut state, deadline).timed_out() && *state == CompileState::Compiling {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::CompilationTimeout,
                    format!("kernel compilation did not finish within {:?}", timeout),
                ));
            }
        }
        match &*state {
            CompileState::Failed(msg) => Err(RuntimeError::new(RuntimeErrorKind::CompilationFailed, msg.clone())),
            _ => Ok(()),
        }
    }
}

/// A device plus its residency and compilation state.
pub struct DeviceHandle {
    device: Arc<dyn Device>,
    buffers: Mutex<HashMap<BufferId, DeviceBuffer>>,
    gate: CompileGate,
}

impl DeviceHandle {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device, buffers: Mutex::new(HashMap::new()), gate: CompileGate::new() }
    }

    pub fn class(&self) -> DeviceClass {
        self.device.class()
    }

    pub fn is_available(&self) -> bool {
        self.device.is_available()
    }

    pub fn gate(&self) -> &CompileGate {
        &self.gate
    }

    pub fn has_buffer(&self, buffer: BufferId) -> bool {
        self.buffers.lock().contains_key(&buffer)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().len()
    }

    /// Make sure `buffer` has a device mirror. Returns true if it was created.
    pub fn transfer_to_device(&self, buffer: BufferId, info: DeviceBuffer) -> bool {
        let mut buffers = self.buffers.lock();
        if buffers.contains_key(&buffer) {
            return false;
        }
        buffers.insert(buffer, info);
        true
    }

    /// Write every buffer the kernels may have modified back to the host
    /// and drop all device mirrors.
    pub fn clean_up_buffers(&self) -> Result<(), RuntimeError> {
        let drained: Vec<(BufferId, DeviceBuffer)> = self.buffers.lock().drain().collect();
        debug!("{}: cleaning up {} buffer(s)", self.class(), drained.len());
        for (id, info) in &drained {
            if info.transfer.needs_read_back() {
                self.device.read_back(*id, info)?;
            }
            self.device.release(*id);
        }
        Ok(())
    }

    fn compile_now(&self) -> Result<(), RuntimeError> {
        info!("compiling kernels for {}", self.class());
        let result = self.device.compile();
        self.gate.finish(&result);
        result
    }
}

/// One handle per accelerator class.
pub struct DeviceSet {
    devices: Vec<Arc<DeviceHandle>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    compile_timeout: Duration,
}

impl DeviceSet {
    pub fn new(devices: Vec<Arc<dyn Device>>, compile_timeout: Duration) -> Self {
        Self {
            devices: devices.into_iter().map(|d| Arc::new(DeviceHandle::new(d))).collect(),
            workers: Mutex::new(Vec::new()),
            compile_timeout,
        }
    }

    /// A set without accelerators; every decision falls back to the host.
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(0))
    }

    pub fn get(&self, class: DeviceClass) -> Option<&Arc<DeviceHandle>> {
        self.devices.iter().find(|d| d.class() == class)
    }

    /// The host is always available; a class without a device never is.
    pub fn is_available(&self, class: DeviceClass) -> bool {
        match class {
            DeviceClass::Legacy => true,
            _ => self.get(class).map_or(false, |d| d.is_available()),
        }
    }

    /// First accelerator, in residency lookup order, holding `buffer`.
    pub fn holder_of(&self, buffer: BufferId) -> Option<DeviceClass> {
        DeviceClass::ACCELERATORS
            .into_iter()
            .find(|c| self.get(*c).map_or(false, |d| d.has_buffer(buffer)))
    }

    /// Make `class` ready for kernel execution.
    ///
    /// Every other device that has not started compiling is compiled on a
    /// background thread. The target is compiled on the calling thread, or
    /// waited for if a background compilation already claimed it.
    pub fn compile_for(&self, class: DeviceClass) -> Result<(), RuntimeError> {
        for other in self.devices.iter().filter(|d| d.class() != class) {
            if other.gate.try_begin() {
                let handle = Arc::clone(other);
                debug!("background compilation for {}", handle.class());
                let worker = std::thread::spawn(move || {
                    if let Err(e) = handle.compile_now() {
                        warn!("background compilation for {} failed: {}", handle.class(), e);
                    }
                });
                self.workers.lock().push(worker);
            }
        }

        let Some(target) = self.get(class) else {
            return match class {
                DeviceClass::Legacy => Ok(()),
                _ => Err(RuntimeError::new(
                    RuntimeErrorKind::DeviceUnavailable,
                    format!("no {} device registered", class),
                )),
            };
        };
        if target.gate.try_begin() {
            target.compile_now()
        } else {
            target.gate.wait(self.compile_timeout)
        }
    }

    /// Read back and release every buffer on `class`.
    pub fn clean_up(&self, class: DeviceClass) -> Result<(), RuntimeError> {
        match self.get(class) {
            Some(device) => device.clean_up_buffers(),
            None => Ok(()),
        }
    }

    /// Wait for all background compilations.
    pub fn join_workers(&self) {
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for w in workers {
            if w.join().is_err() {
                warn!("a compiler thread panicked");
            }
        }
    }
}

impl Drop for DeviceSet {
    fn drop(&mut self) {
        self.join_workers();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory device recording what the runtime asked of it.
    pub struct FakeDevice {
        pub class: DeviceClass,
        pub available: bool,
        pub compile_delay: Duration,
        pub compiles: AtomicUsize,
        pub read_backs: Mutex<Vec<BufferId>>,
    }

    impl FakeDevice {
        pub fn new(class: DeviceClass) -> Self {
            Self {
                class,
                available: true,
                compile_delay: Duration::from_millis(0),
                compiles: AtomicUsize::new(0),
                read_backs: Mutex::new(Vec::new()),
            }
        }

        pub fn compile_count(&self) -> usize {
            self.compiles.load(Ordering::SeqCst)
        }
    }

    impl Device for FakeDevice {
        fn class(&self) -> DeviceClass {
            self.class
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn compile(&self) -> Result<(), RuntimeError> {
            std::thread::sleep(self.compile_delay);
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read_back(&self, buffer: BufferId, _info: &DeviceBuffer) -> Result<(), RuntimeError> {
            self.read_backs.lock().push(buffer);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeDevice;
    use super::*;
    use crate::utils::intern::BufferInterner;

    fn info(transfer: TransferType) -> DeviceBuffer {
        DeviceBuffer { transfer, size: 16, elem_size: 8 }
    }

    #[test]
    fn test_residency_and_cleanup() {
        let gpu = Arc::new(FakeDevice::new(DeviceClass::Gpu));
        let set = DeviceSet::new(vec![gpu.clone() as Arc<dyn Device>], Duration::from_secs(1));
        let mut ids = BufferInterner::new();
        let (a, b) = (ids.intern("A"), ids.intern("B"));

        let handle = set.get(DeviceClass::Gpu).unwrap();
        assert!(handle.transfer_to_device(a, info(TransferType::In)));
        assert!(!handle.transfer_to_device(a, info(TransferType::In)));
        assert!(handle.transfer_to_device(b, info(TransferType::Out)));
        assert_eq!(set.holder_of(a), Some(DeviceClass::Gpu));

        set.clean_up(DeviceClass::Gpu).unwrap();
        assert_eq!(*gpu.read_backs.lock(), vec![b]);
        assert_eq!(handle.buffer_count(), 0);
        assert_eq!(set.holder_of(a), None);
    }

    #[test]
    fn test_compile_for_starts_background_compilation() {
        let gpu = Arc::new(FakeDevice::new(DeviceClass::Gpu));
        let cpu = Arc::new(FakeDevice::new(DeviceClass::MultiCore));
        let set = DeviceSet::new(vec![cpu.clone() as Arc<dyn Device>, gpu.clone() as Arc<dyn Device>], Duration::from_secs(5));

        set.compile_for(DeviceClass::Gpu).unwrap();
        assert!(set.get(DeviceClass::Gpu).unwrap().gate().is_compiled());
        set.join_workers();
        assert!(set.get(DeviceClass::MultiCore).unwrap().gate().is_compiled());

        set.compile_for(DeviceClass::MultiCore).unwrap();
        assert_eq!(gpu.compile_count(), 1);
        assert_eq!(cpu.compile_count(), 1);
    }

    #[test]
    fn test_wait_times_out() {
        let gate = CompileGate::new();
        assert!(gate.try_begin());
        let err = gate.wait(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::CompilationTimeout);

        gate.finish(&Ok(()));
        assert!(gate.wait(Duration::from_millis(10)).is_ok());
        assert!(!gate.try_begin());
    }

    #[test]
    fn test_wait_reports_failure() {
        let gate = CompileGate::new();
        assert!(gate.try_begin());
        gate.finish(&Err(RuntimeError::new(RuntimeErrorKind::CompilationFailed, "bad kernel")));
        assert_eq!(gate.wait(Duration::from_millis(10)).unwrap_err().kind, RuntimeErrorKind::CompilationFailed);
    }

    #[test]
    fn test_missing_device_is_unavailable() {
        let set = DeviceSet::empty();
        assert!(set.is_available(DeviceClass::Legacy));
        assert!(!set.is_available(DeviceClass::ManyCore));
        assert!(set.compile_for(DeviceClass::Legacy).is_ok());
        assert_eq!(set.compile_for(DeviceClass::Gpu).unwrap_err().kind, RuntimeErrorKind::DeviceUnavailable);
    }
}
