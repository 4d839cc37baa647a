use crate::device::Device;
use crate::error::ChipsError;
use crate::events::{Event, EventBus};
use crate::interpreter::ExecState;
use crate::isa::InstructionSet;
use crate::network::{DeviceId, Fabric, NetworkAddress, Outbox};
use std::rc::Rc;
use tracing::{debug, info};

type SolutionCheck = Box<dyn Fn(&Puzzle) -> bool>;

pub struct Puzzle {
    name: String,
    devices: Vec<Device>,
    fabric: Fabric,
    events: Rc<EventBus>,
    state: ExecState,
    solution: Option<SolutionCheck>,
    solved: bool,
    ticks: u64,
}

impl Puzzle {
    pub fn new(name: &str) -> Self {
        Puzzle {
            name: name.to_string(),
            devices: Vec::new(),
            fabric: Fabric::new(),
            events: EventBus::new(),
            state: ExecState::Edit,
            solution: None,
            solved: false,
            ticks: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// the observer list every device of this puzzle reports to
    pub fn events(&self) -> &Rc<EventBus> {
        &self.events
    }

    pub fn state(&self) -> ExecState {
        self.state
    }

    /// ticks since the last stop
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// wire a device in at its own address, which must be free. devices only
    /// come in through the add_* constructors so they all report to this
    /// puzzle's event bus
    fn add_device(&mut self, device: Device) -> Result<DeviceId, ChipsError> {
        let id = DeviceId(self.devices.len());
        self.fabric.attach(device.address(), id)?;
        info!(device = %device.address(), name = device.name(), "attached");
        self.devices.push(device);
        Ok(id)
    }

    pub fn add_vm(
        &mut self,
        name: &str,
        address: NetworkAddress,
        memory_size: usize,
        register_count: usize,
        isa: Rc<InstructionSet>,
    ) -> Result<DeviceId, ChipsError> {
        let events = Rc::clone(&self.events);
        self.add_device(Device::vm(name, address, memory_size, register_count, isa, events)?)
    }

    pub fn add_ram(&mut self, name: &str, address: NetworkAddress, memory_size: usize) -> Result<DeviceId, ChipsError> {
        let events = Rc::clone(&self.events);
        self.add_device(Device::ram(name, address, memory_size, events))
    }

    pub fn add_display(
        &mut self,
        name: &str,
        address: NetworkAddress,
        memory_size: usize,
    ) -> Result<DeviceId, ChipsError> {
        let events = Rc::clone(&self.events);
        self.add_device(Device::display(name, address, memory_size, events))
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(id.0)
    }

    pub fn device_mut(&mut self, id: DeviceId) -> Option<&mut Device> {
        self.devices.get_mut(id.0)
    }

    pub fn resolve(&self, address: NetworkAddress) -> Option<DeviceId> {
        self.fabric.resolve(address)
    }

    /// device at a network address
    pub fn device_at(&self, address: NetworkAddress) -> Option<&Device> {
        self.device(self.resolve(address)?)
    }

    /// external win condition, checked after every tick
    pub fn set_solution(&mut self, check: impl Fn(&Puzzle) -> bool + 'static) {
        self.solution = Some(Box::new(check));
    }

    pub fn is_solved(&self) -> bool {
        self.solution.as_ref().map_or(false, |check| check(self))
    }

    pub fn run(&mut self) {
        self.devices.iter_mut().for_each(Device::run);
        self.state = ExecState::Running;
        info!(puzzle = %self.name, "run");
    }

    pub fn pause(&mut self) {
        if self.state == ExecState::Running {
            self.devices.iter_mut().for_each(Device::pause);
            self.state = ExecState::Paused;
            info!(puzzle = %self.name, "pause");
        }
    }

    pub fn stop(&mut self) {
        self.devices.iter_mut().for_each(Device::stop);
        self.state = ExecState::Edit;
        self.solved = false;
        self.ticks = 0;
        info!(puzzle = %self.name, "stop");
    }

    /// One manual tick, for single stepping outside a run. Every device steps,
    /// halted or not. Stepping from edit first sets up a run (so stop can
    /// restore memory) and leaves the puzzle paused.
    pub fn step(&mut self) -> Vec<(DeviceId, ChipsError)> {
        match self.state {
            ExecState::Running => return Vec::new(),
            ExecState::Edit => {
                self.run();
                self.pause();
            }
            ExecState::Paused => {}
        }
        self.advance(false)
    }

    /// One tick of the running cadence; nothing unless running. VMs that
    /// halted on an error sit out, peripherals always step.
    pub fn tick(&mut self) -> Vec<(DeviceId, ChipsError)> {
        if self.state != ExecState::Running {
            return Vec::new();
        }
        self.advance(true)
    }

    fn advance(&mut self, running_only: bool) -> Vec<(DeviceId, ChipsError)> {
        let mut failures = Vec::new();
        for i in 0..self.devices.len() {
            let device = &self.devices[i];
            if running_only && device.is_vm() && device.state() != ExecState::Running {
                continue;
            }
            let mut outbox = Outbox::new(&self.fabric, device.address());
            let result = self.devices[i].step(&mut outbox);
            for post in outbox.into_posts() {
                if let Some(to) = self.devices.get_mut(post.to.0) {
                    to.post_incoming(post.from, post.transaction);
                }
            }
            if let Err(e) = result {
                failures.push((DeviceId(i), e));
            }
        }
        self.ticks += 1;
        debug!(puzzle = %self.name, tick = self.ticks, failures = failures.len(), "tick");

        // announce only the moment it becomes solved
        let solved = self.is_solved();
        if solved && !self.solved {
            info!(puzzle = %self.name, ticks = self.ticks, "solved");
            self.events.emit(Event::PuzzleSolved);
            self.pause();
        }
        self.solved = solved;
        failures
    }
}

impl Drop for Puzzle {
    fn drop(&mut self) {
        self.events.clear();
    }
}
