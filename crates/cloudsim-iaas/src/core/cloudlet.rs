//! Cloudlet (unit of work executed by a VM).

use serde::Serialize;

use crate::core::common::is_negligible;
use crate::core::error::CloudError;
use crate::core::task::{Task, TaskKind, TaskSequence};
use crate::core::utilization::UtilizationModel;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum CloudletStatus {
    Created,
    Queued,
    InExec,
    Paused,
    Success,
    Failed,
    Canceled,
}

#[derive(Clone, Debug, Serialize)]
pub enum CloudletKind {
    Simple,
    Network(TaskSequence),
}

#[derive(Clone, Debug, Serialize)]
pub struct Cloudlet {
    pub id: u32,
    length: f64,
    pub pe_count: u32,
    pub file_size: u64,
    pub output_size: u64,
    pub utilization_cpu: UtilizationModel,
    pub utilization_ram: UtilizationModel,
    pub utilization_bw: UtilizationModel,
    kind: CloudletKind,
    pub status: CloudletStatus,
    finished_so_far: f64,

    pub vm_id: Option<u32>,
    pub host_id: Option<u32>,
    pub datacenter_id: Option<u32>,
    pub submission_time: Option<f64>,
    pub exec_start_time: Option<f64>,
    pub finish_time: Option<f64>,
}

impl Cloudlet {
    /// Creates cloudlet of specified length (in million instructions) using full utilization models.
    pub fn new(id: u32, length: f64, pe_count: u32) -> Self {
        Self {
            id,
            length,
            pe_count,
            file_size: 0,
            output_size: 0,
            utilization_cpu: UtilizationModel::Full,
            utilization_ram: UtilizationModel::Full,
            utilization_bw: UtilizationModel::Full,
            kind: CloudletKind::Simple,
            status: CloudletStatus::Created,
            finished_so_far: 0.,
            vm_id: None,
            host_id: None,
            datacenter_id: None,
            submission_time: None,
            exec_start_time: None,
            finish_time: None,
        }
    }

    /// Creates cloudlet consisting of ordered tasks, its length is the sum of execution task lengths.
    pub fn network(id: u32, pe_count: u32, tasks: Vec<Task>) -> Self {
        let tasks = TaskSequence::new(tasks);
        let mut cloudlet = Self::new(id, tasks.length(), pe_count);
        cloudlet.kind = CloudletKind::Network(tasks);
        cloudlet
    }

    pub fn with_file_sizes(mut self, file_size: u64, output_size: u64) -> Self {
        self.file_size = file_size;
        self.output_size = output_size;
        self
    }

    pub fn with_utilization(mut self, cpu: UtilizationModel, ram: UtilizationModel, bw: UtilizationModel) -> Self {
        self.utilization_cpu = cpu;
        self.utilization_ram = ram;
        self.utilization_bw = bw;
        self
    }

    /// Binds the cloudlet to the VM.
    pub fn with_vm(mut self, vm_id: u32) -> Self {
        self.vm_id = Some(vm_id);
        self
    }

    pub fn validate(&self) -> Result<(), CloudError> {
        let entity = format!("cloudlet {}", self.id);
        if self.pe_count == 0 {
            return Err(CloudError::invalid_spec(entity, "pe_count must be positive"));
        }
        if !self.length.is_finite() || self.length < 0. {
            return Err(CloudError::invalid_spec(
                entity,
                format!("length must be non-negative, got {}", self.length),
            ));
        }
        if let CloudletKind::Network(tasks) = &self.kind {
            for task in tasks.tasks() {
                match task.kind {
                    TaskKind::Execution { length } if !length.is_finite() || length < 0. => {
                        return Err(CloudError::invalid_spec(
                            entity,
                            format!("task length must be non-negative, got {}", length),
                        ));
                    }
                    TaskKind::SendMessage { dst_cloudlet, .. } | TaskKind::ReceiveMessage { src_cloudlet: dst_cloudlet }
                        if dst_cloudlet == self.id =>
                    {
                        return Err(CloudError::invalid_spec(entity, "cloudlet can't communicate with itself"));
                    }
                    _ => {}
                }
            }
        }
        self.utilization_cpu.validate()?;
        if self.length > 0. && self.utilization_cpu.utilization(0.) <= 0. {
            return Err(CloudError::invalid_spec(
                entity,
                "cpu utilization must be positive for a cloudlet with non-zero length",
            ));
        }
        self.utilization_ram.validate()?;
        self.utilization_bw.validate()
    }

    /// Returns the declared length, it is never changed by execution.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Returns the number of instructions processed so far.
    pub fn finished_so_far(&self) -> f64 {
        self.finished_so_far
    }

    pub fn remaining_length(&self) -> f64 {
        (self.length - self.finished_so_far).max(0.)
    }

    pub fn kind(&self) -> &CloudletKind {
        &self.kind
    }

    pub fn tasks(&self) -> Option<&TaskSequence> {
        match &self.kind {
            CloudletKind::Network(tasks) => Some(tasks),
            CloudletKind::Simple => None,
        }
    }

    pub(crate) fn tasks_mut(&mut self) -> Option<&mut TaskSequence> {
        match &mut self.kind {
            CloudletKind::Network(tasks) => Some(tasks),
            CloudletKind::Simple => None,
        }
    }

    fn process(&mut self, amount: f64) {
        self.finished_so_far = (self.finished_so_far + amount).min(self.length);
        if is_negligible(self.remaining_length(), self.length) {
            self.finished_so_far = self.length;
        }
    }

    /// Returns true if all instructions are processed and, for network cloudlets, every task is finished.
    pub fn is_finished(&self) -> bool {
        let processed = self.remaining_length() == 0.;
        match &self.kind {
            CloudletKind::Simple => processed,
            CloudletKind::Network(tasks) => processed && tasks.is_finished(),
        }
    }

    /// Returns the length of work which can be processed before the next state change:
    /// the rest of the cloudlet or the rest of its current execution task.
    ///
    /// Returns zero if the cloudlet is blocked on communication.
    pub(crate) fn current_demand(&self) -> f64 {
        match &self.kind {
            CloudletKind::Simple => self.remaining_length(),
            CloudletKind::Network(tasks) => match tasks.current() {
                Some(task) if task.is_execution() && !task.is_finished() => task.remaining_length(),
                _ => 0.,
            },
        }
    }

    /// Accounts processed instructions in the current execution task of network cloudlet
    /// or in the cloudlet itself.
    pub(crate) fn advance(&mut self, amount: f64) {
        match &mut self.kind {
            CloudletKind::Simple => self.process(amount),
            CloudletKind::Network(tasks) => {
                if let Some(task) = tasks.current_mut() {
                    task.process(amount);
                }
                self.finished_so_far = tasks.processed();
            }
        }
    }
}
