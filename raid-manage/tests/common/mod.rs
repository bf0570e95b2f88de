// SPDX-License-Identifier: GPL-3.0-only

//! In-memory fakes of the system capabilities, recording every call
//! so tests can assert on the exact kernel/sysfs traffic.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use nix::errno::Errno;
use raid_sys::{
    ActiveArray, ArrayEnumerator, ArrayKernel, ArrayOpener, BlockStat, DeviceAccess,
    ExclusiveGuard, HolderCheck, MonitorGateway, NameMap, NameMapEntry, NewMember, NodeProbe,
    Result as SysResult, StateHandle, Supertype, SysError, SysfsApi,
};
use raid_types::{
    ArrayInfo, DevId, DiskFlag, DiskSlot, MetaUpdate, RaidLevel, RaidVersion, SubarrayUpdate,
};
use uuid::Uuid;

pub fn raid1_array(raid_disks: i32, active: i32) -> ArrayInfo {
    ArrayInfo {
        level: RaidLevel::Raid1,
        layout: 0,
        raid_disks,
        nr_disks: raid_disks,
        active_disks: active,
        working_disks: active,
        failed_disks: raid_disks - active,
        spare_disks: 0,
        major_version: 1,
        minor_version: 2,
        not_persistent: false,
        size_kib: 1024,
    }
}

pub fn active_slot(number: i32, dev: DevId) -> DiskSlot {
    DiskSlot {
        number,
        dev,
        raid_disk: number,
        state: DiskFlag::Active | DiskFlag::Sync,
    }
}

pub fn faulty_slot(number: i32, dev: DevId) -> DiskSlot {
    DiskSlot {
        number,
        dev,
        raid_disk: -1,
        state: DiskFlag::Faulty.into(),
    }
}

#[derive(Clone)]
pub struct FakeKernel {
    pub dev: DevId,
    pub version: RaidVersion,
    pub array: Option<ArrayInfo>,
    pub slots: Rc<RefCell<BTreeMap<i32, DiskSlot>>>,
    pub calls: Rc<RefCell<Vec<String>>>,
    /// Remaining busy rejections before `stop` succeeds.
    pub stop_busy: Rc<Cell<u32>>,
    pub fail: Rc<RefCell<HashMap<String, Errno>>>,
}

impl FakeKernel {
    pub fn new(dev: DevId, array: Option<ArrayInfo>) -> Self {
        FakeKernel {
            dev,
            version: RaidVersion::new(0, 90, 3),
            array,
            slots: Rc::new(RefCell::new(BTreeMap::new())),
            calls: Rc::new(RefCell::new(Vec::new())),
            stop_busy: Rc::new(Cell::new(0)),
            fail: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn with_slots(self, slots: Vec<DiskSlot>) -> Self {
        *self.slots.borrow_mut() = slots.into_iter().map(|s| (s.number, s)).collect();
        self
    }

    pub fn fail_op(&self, op: &str, errno: Errno) {
        self.fail.borrow_mut().insert(op.to_string(), errno);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_named(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, op: &str, call: String) -> SysResult<()> {
        if let Some(errno) = self.fail.borrow().get(op) {
            return Err(SysError::kernel("faked", *errno));
        }
        self.calls.borrow_mut().push(call);
        Ok(())
    }
}

impl ArrayKernel for FakeKernel {
    fn dev_num(&self) -> DevId {
        self.dev
    }

    fn driver_version(&self) -> SysResult<RaidVersion> {
        Ok(self.version)
    }

    fn array_info(&self) -> SysResult<ArrayInfo> {
        self.array
            .ok_or_else(|| SysError::kernel("GET_ARRAY_INFO", Errno::ENODEV))
    }

    fn disk_info(&self, number: i32) -> SysResult<DiskSlot> {
        Ok(self
            .slots
            .borrow()
            .get(&number)
            .copied()
            .unwrap_or_else(|| DiskSlot::empty(number)))
    }

    fn run(&self) -> SysResult<()> {
        self.record("run", "run".to_string())
    }

    fn stop(&self) -> SysResult<()> {
        self.calls.borrow_mut().push("stop".to_string());
        let busy = self.stop_busy.get();
        if busy > 0 {
            self.stop_busy.set(busy - 1);
            return Err(SysError::kernel("STOP_ARRAY", Errno::EBUSY));
        }
        if let Some(errno) = self.fail.borrow().get("stop") {
            return Err(SysError::kernel("STOP_ARRAY", *errno));
        }
        Ok(())
    }

    fn legacy_stop(&self) -> SysResult<()> {
        self.record("legacy_stop", "legacy_stop".to_string())
    }

    fn set_readonly(&self) -> SysResult<()> {
        self.record("set_readonly", "set_readonly".to_string())
    }

    fn set_readwrite(&self) -> SysResult<()> {
        self.record("set_readwrite", "set_readwrite".to_string())
    }

    fn hot_add(&self, dev: DevId) -> SysResult<()> {
        self.record("hot_add", format!("hot_add {dev}"))
    }

    fn hot_remove(&self, dev: DevId) -> SysResult<()> {
        self.record("hot_remove", format!("hot_remove {dev}"))
    }

    fn set_faulty(&self, dev: DevId) -> SysResult<()> {
        self.record("set_faulty", format!("set_faulty {dev}"))
    }

    fn add_disk(&self, slot: &DiskSlot) -> SysResult<()> {
        self.record(
            "add_disk",
            format!(
                "add_disk {} number={} raid_disk={} state={:#x}",
                slot.dev,
                slot.number,
                slot.raid_disk,
                slot.state.bits()
            ),
        )
    }

    fn reread_partitions(&self) -> SysResult<()> {
        self.record("reread_partitions", "reread_partitions".to_string())
    }
}

pub struct FakeOpener {
    pub kernel: FakeKernel,
    pub excl_ok: bool,
    pub by_num_ok: bool,
}

impl FakeOpener {
    pub fn new(kernel: FakeKernel) -> Self {
        FakeOpener {
            kernel,
            excl_ok: true,
            by_num_ok: true,
        }
    }
}

impl ArrayOpener for FakeOpener {
    fn open(&self, _path: &str) -> SysResult<Box<dyn ArrayKernel>> {
        Ok(Box::new(self.kernel.clone()))
    }

    fn open_excl(&self, _path: &str) -> SysResult<Box<dyn ArrayKernel>> {
        if self.excl_ok {
            Ok(Box::new(self.kernel.clone()))
        } else {
            Err(SysError::kernel("open", Errno::EBUSY))
        }
    }

    fn open_excl_by_num(&self, _dev: DevId) -> SysResult<Box<dyn ArrayKernel>> {
        if self.by_num_ok {
            Ok(Box::new(self.kernel.clone()))
        } else {
            Err(SysError::kernel("open", Errno::EBUSY))
        }
    }
}

struct LogWriter {
    attr: String,
    sink: Arc<Mutex<Vec<(String, String)>>>,
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink
            .lock()
            .unwrap()
            .push((self.attr.clone(), String::from_utf8_lossy(buf).to_string()));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct FakeSysfs {
    pub name: String,
    pub level: Option<RaidLevel>,
    pub metadata_version: Option<String>,
    pub component_size: u64,
    pub freeze_works: bool,
    pub member_devs: HashMap<String, DevId>,
    /// Members whose device-number link is gone but whose state entry
    /// remains writable.
    pub state_only_members: HashSet<String>,
    pub holders: HashMap<DevId, HolderCheck>,
    /// Busy rejections left for array_state writes.
    pub state_busy: Cell<u32>,
    pub log: RefCell<Vec<String>>,
    /// Writes made through handed-out state handles.
    pub state_writes: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeSysfs {
    pub fn new(name: &str) -> Self {
        FakeSysfs {
            name: name.to_string(),
            level: Some(RaidLevel::Raid1),
            metadata_version: Some("1.2".to_string()),
            component_size: 0,
            freeze_works: true,
            member_devs: HashMap::new(),
            state_only_members: HashSet::new(),
            holders: HashMap::new(),
            state_busy: Cell::new(0),
            log: RefCell::new(Vec::new()),
            state_writes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl SysfsApi for FakeSysfs {
    fn sys_name(&self) -> &str {
        &self.name
    }

    fn write_array_state(&self, state: &str) -> SysResult<()> {
        let busy = self.state_busy.get();
        if busy > 0 {
            self.state_busy.set(busy - 1);
            return Err(SysError::kernel("array_state", Errno::EBUSY));
        }
        self.log.borrow_mut().push(format!("array_state={state}"));
        Ok(())
    }

    fn metadata_version(&self) -> SysResult<Option<String>> {
        Ok(self.metadata_version.clone())
    }

    fn write_metadata_version(&self, version: &str) -> SysResult<()> {
        self.log
            .borrow_mut()
            .push(format!("metadata_version={version}"));
        Ok(())
    }

    fn level(&self) -> SysResult<Option<RaidLevel>> {
        Ok(self.level)
    }

    fn component_size(&self) -> SysResult<u64> {
        Ok(self.component_size)
    }

    fn freeze(&self) -> bool {
        self.log.borrow_mut().push("freeze".to_string());
        self.freeze_works
    }

    fn thaw(&self) {
        self.log.borrow_mut().push("thaw".to_string());
    }

    fn uevent_change(&self) {
        self.log.borrow_mut().push("uevent=change".to_string());
    }

    fn member_names(&self) -> SysResult<Vec<String>> {
        let mut names: Vec<_> = self
            .member_devs
            .keys()
            .map(|name| format!("dev-{name}"))
            .collect();
        names.sort();
        Ok(names)
    }

    fn member_devnum(&self, kernel_name: &str) -> SysResult<Option<DevId>> {
        Ok(self.member_devs.get(kernel_name).copied())
    }

    fn member_by_dev(&self, dev: DevId) -> SysResult<Option<String>> {
        Ok(self
            .member_devs
            .iter()
            .find(|(_, member)| **member == dev)
            .map(|(name, _)| name.clone()))
    }

    fn write_member_state(&self, kernel_name: &str, value: &str) -> SysResult<()> {
        self.log
            .borrow_mut()
            .push(format!("dev-{kernel_name}/state={value}"));
        Ok(())
    }

    fn open_member_state(&self, kernel_name: &str) -> SysResult<StateHandle> {
        if !self.member_devs.contains_key(kernel_name)
            && !self.state_only_members.contains(kernel_name)
        {
            return Err(SysError::DeviceNotFound(kernel_name.to_string()));
        }
        let attr = format!("dev-{kernel_name}/state");
        Ok(StateHandle::new(
            attr.clone(),
            Box::new(LogWriter {
                attr,
                sink: self.state_writes.clone(),
            }),
        ))
    }

    fn unique_holder(&self, member: DevId) -> SysResult<HolderCheck> {
        Ok(self
            .holders
            .get(&member)
            .copied()
            .unwrap_or(HolderCheck::Unique))
    }

    fn add_disk(&self, member: &NewMember) -> SysResult<()> {
        self.log.borrow_mut().push(format!("new_dev={}", member.dev));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathEntry {
    pub dev: DevId,
    pub is_block: bool,
    pub size_sectors: u64,
    pub openable: bool,
}

impl PathEntry {
    pub fn block(dev: DevId, size_sectors: u64) -> Self {
        PathEntry {
            dev,
            is_block: true,
            size_sectors,
            openable: true,
        }
    }
}

struct FakeGuard;
impl ExclusiveGuard for FakeGuard {}

pub struct FakeDevices {
    pub paths: HashMap<String, PathEntry>,
    pub dev_paths: HashMap<DevId, String>,
    pub gone: HashSet<DevId>,
    pub busy_paths: HashSet<String>,
    pub excl_ok: bool,
    pub log: RefCell<Vec<String>>,
}

impl FakeDevices {
    pub fn new() -> Self {
        FakeDevices {
            paths: HashMap::new(),
            dev_paths: HashMap::new(),
            gone: HashSet::new(),
            busy_paths: HashSet::new(),
            excl_ok: true,
            log: RefCell::new(Vec::new()),
        }
    }

    /// Register a block device under a path and in the reverse map.
    pub fn with_block(mut self, path: &str, dev: DevId, size_sectors: u64) -> Self {
        self.paths.insert(path.to_string(), PathEntry::block(dev, size_sectors));
        self.dev_paths.insert(dev, path.to_string());
        self
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }
}

impl DeviceAccess for FakeDevices {
    fn probe_node(&self, dev: DevId) -> NodeProbe {
        if self.gone.contains(&dev) {
            NodeProbe::Gone
        } else {
            NodeProbe::Present
        }
    }

    fn stat_path(&self, path: &str) -> SysResult<BlockStat> {
        match self.paths.get(path) {
            Some(entry) if entry.openable => Ok(BlockStat {
                dev: entry.dev,
                is_block: entry.is_block,
            }),
            Some(_) => Err(SysError::kernel("open", Errno::ENXIO)),
            None => Err(SysError::kernel("open", Errno::ENOENT)),
        }
    }

    fn lstat_path(&self, path: &str) -> SysResult<BlockStat> {
        match self.paths.get(path) {
            Some(entry) => Ok(BlockStat {
                dev: entry.dev,
                is_block: entry.is_block,
            }),
            None => Err(SysError::kernel("lstat", Errno::ENOENT)),
        }
    }

    fn claim_check(&self, path: &str) -> SysResult<()> {
        if self.busy_paths.contains(path) {
            return Err(SysError::kernel("open", Errno::EBUSY));
        }
        Ok(())
    }

    fn size_sectors(&self, path: &str) -> SysResult<u64> {
        self.paths
            .get(path)
            .map(|entry| entry.size_sectors)
            .ok_or_else(|| SysError::DeviceNotFound(path.to_string()))
    }

    fn drop_partitions(&self, path: &str) -> SysResult<()> {
        self.log
            .borrow_mut()
            .push(format!("drop_partitions {path}"));
        Ok(())
    }

    fn path_of(&self, dev: DevId) -> Option<String> {
        self.dev_paths.get(&dev).cloned()
    }

    fn open_array_excl(&self, dev: DevId) -> SysResult<Box<dyn ExclusiveGuard>> {
        if !self.excl_ok {
            return Err(SysError::kernel("open", Errno::EBUSY));
        }
        self.log.borrow_mut().push(format!("excl {dev}"));
        Ok(Box::new(FakeGuard))
    }
}

pub struct FakeMonitor {
    pub is_running: bool,
    pub pings: RefCell<Vec<String>>,
}

impl FakeMonitor {
    pub fn new() -> Self {
        FakeMonitor {
            is_running: false,
            pings: RefCell::new(Vec::new()),
        }
    }

    pub fn pings(&self) -> Vec<String> {
        self.pings.borrow().clone()
    }
}

impl MonitorGateway for FakeMonitor {
    fn running(&self, _container: DevId) -> bool {
        self.is_running
    }

    fn ping_monitor(&self, container: &str) {
        self.pings.borrow_mut().push(format!("monitor {container}"));
    }

    fn ping_monitor_by_id(&self, dev: DevId) {
        self.pings.borrow_mut().push(format!("monitor-id {dev}"));
    }

    fn ping_manager(&self, devname: &str) {
        self.pings.borrow_mut().push(format!("manager {devname}"));
    }
}

#[derive(Clone)]
pub struct FakeSupertype {
    pub external: bool,
    pub max: i32,
    pub member_of: Option<String>,
    pub container: Option<DevId>,
    pub geometry_ok: bool,
    /// Sectors the format reserves for itself.
    pub overhead: u64,
    pub array_uuid: Uuid,
    /// Residual superblocks by device path.
    pub device_supers: HashMap<String, (DiskSlot, Uuid)>,
    pub loaded: Option<(DiskSlot, Uuid)>,
    pub queue_mode: bool,
    pub log: Rc<RefCell<Vec<String>>>,
}

impl FakeSupertype {
    pub fn native() -> Self {
        FakeSupertype {
            external: false,
            max: 128,
            member_of: None,
            container: None,
            geometry_ok: true,
            overhead: 0,
            array_uuid: Uuid::from_u128(0xA11CE),
            device_supers: HashMap::new(),
            loaded: None,
            queue_mode: false,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn external_format(container: DevId) -> Self {
        FakeSupertype {
            external: true,
            container: Some(container),
            ..FakeSupertype::native()
        }
    }

    /// Record a residual superblock for a candidate device.
    pub fn with_device_super(mut self, path: &str, slot: DiskSlot, uuid: Uuid) -> Self {
        self.device_supers.insert(path.to_string(), (slot, uuid));
        self
    }

    pub fn log_entries(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn push(&self, entry: String) {
        self.log.borrow_mut().push(entry);
    }
}

impl Supertype for FakeSupertype {
    fn format_name(&self) -> &str {
        "fake"
    }

    fn is_external(&self) -> bool {
        self.external
    }

    fn max_devs(&self) -> i32 {
        self.max
    }

    fn has_super(&self) -> bool {
        self.loaded.is_some()
    }

    fn load_super(&mut self, device: &str) -> SysResult<()> {
        match self.device_supers.get(device) {
            Some(entry) => {
                self.loaded = Some(*entry);
                self.push(format!("load_super {device}"));
                Ok(())
            }
            None => Err(SysError::Metadata(format!("no superblock on {device}"))),
        }
    }

    fn store_super(&self, device: &str) -> SysResult<()> {
        self.push(format!("store_super {device}"));
        Ok(())
    }

    fn free_super(&mut self) {
        self.loaded = None;
    }

    fn load_container(&mut self, container: DevId) -> SysResult<()> {
        self.loaded = Some((DiskSlot::empty(0), self.array_uuid));
        self.push(format!("load_container {container}"));
        Ok(())
    }

    fn recorded_disk(&self) -> SysResult<DiskSlot> {
        self.loaded
            .map(|(slot, _)| slot)
            .ok_or_else(|| SysError::Metadata("no superblock loaded".to_string()))
    }

    fn uuid(&self) -> SysResult<Uuid> {
        self.loaded
            .map(|(_, uuid)| uuid)
            .ok_or_else(|| SysError::Metadata("no superblock loaded".to_string()))
    }

    fn fits_geometry(&self, _array: &ArrayInfo, _size_sectors: u64) -> bool {
        self.geometry_ok
    }

    fn avail_size(&self, size_sectors: u64) -> u64 {
        size_sectors.saturating_sub(self.overhead)
    }

    fn add_to_super(&mut self, slot: &DiskSlot, device: &str) -> SysResult<()> {
        self.push(format!(
            "add_to_super {device} number={} raid_disk={}",
            slot.number, slot.raid_disk
        ));
        Ok(())
    }

    fn write_init_super(&mut self) -> SysResult<()> {
        self.push("write_init_super".to_string());
        Ok(())
    }

    fn update_super(&mut self, update: &MetaUpdate, device: &str) -> SysResult<()> {
        self.push(format!("update_super {update:?} {device}"));
        Ok(())
    }

    fn sync_metadata(&mut self) -> SysResult<()> {
        self.push("sync_metadata".to_string());
        Ok(())
    }

    fn queue_updates(&mut self) {
        self.queue_mode = true;
    }

    fn has_queued_updates(&self) -> bool {
        self.queue_mode
    }

    fn flush_updates(&mut self) -> SysResult<()> {
        self.push("flush_updates".to_string());
        Ok(())
    }

    fn dup(&self) -> Box<dyn Supertype> {
        Box::new(self.clone())
    }

    fn container_dev(&self) -> Option<DevId> {
        self.container
    }

    fn subarray(&self) -> Option<&str> {
        self.member_of.as_deref()
    }

    fn update_subarray(&mut self, subarray: &str, update: &SubarrayUpdate) -> SysResult<()> {
        self.push(format!("update_subarray {subarray} {:?}", update.kind()));
        Ok(())
    }
}

pub struct FakeEnumerator {
    pub arrays: Vec<ActiveArray>,
}

impl ArrayEnumerator for FakeEnumerator {
    fn active_arrays(&self) -> SysResult<Vec<ActiveArray>> {
        Ok(self.arrays.clone())
    }
}

pub struct FakeNameMap {
    pub entries: RefCell<HashMap<DevId, String>>,
    pub removed: RefCell<Vec<DevId>>,
}

impl FakeNameMap {
    pub fn new() -> Self {
        FakeNameMap {
            entries: RefCell::new(HashMap::new()),
            removed: RefCell::new(Vec::new()),
        }
    }
}

impl NameMap for FakeNameMap {
    fn lookup_path(&self, dev: DevId) -> SysResult<Option<String>> {
        Ok(self.entries.borrow().get(&dev).cloned())
    }

    fn insert(&mut self, entry: NameMapEntry) -> SysResult<()> {
        self.entries.borrow_mut().insert(entry.dev, entry.path);
        Ok(())
    }

    fn remove(&mut self, dev: DevId) -> SysResult<()> {
        self.entries.borrow_mut().remove(&dev);
        self.removed.borrow_mut().push(dev);
        Ok(())
    }
}
