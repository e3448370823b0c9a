//! Sharing of VM capacity among cloudlets.
//!
//! The scheduler keeps the progress of its cloudlets up to date with the rates computed at the previous update.
//! Every mutating operation first accounts the work done since then, so that the caller only needs to invoke
//! [`CloudletScheduler::update`] afterwards to get the new rates and the time of the next state change.

use std::mem;

use serde::{Deserialize, Serialize};

use crate::core::cloudlet::{Cloudlet, CloudletStatus};
use crate::core::error::CloudError;
use crate::core::task::TaskKind;

/// Policy of sharing VM capacity among cloudlets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CloudletSchedulerPolicy {
    /// All cloudlets run concurrently sharing VM PEs.
    #[default]
    TimeShared,
    /// Cloudlets run on dedicated VM PEs, the rest wait in FIFO queue.
    SpaceShared,
}

/// Message sent by a network cloudlet to another cloudlet.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Packet {
    pub src_cloudlet: u32,
    pub dst_cloudlet: u32,
    pub payload: u64,
    pub send_time: f64,
}

/// Outcome of scheduler update.
#[derive(Debug, Default)]
pub struct SchedulerUpdate {
    /// Cloudlets completed by now.
    pub finished: Vec<Cloudlet>,
    /// Packets sent by now.
    pub packets: Vec<Packet>,
    /// Time of the next predicted state change (completion of a cloudlet or its execution task).
    pub next_event: Option<f64>,
}

#[derive(Clone, Debug)]
struct Entry {
    cloudlet: Cloudlet,
    arrival_time: f64,
    rate: f64,
}

impl Entry {
    fn new(mut cloudlet: Cloudlet, time: f64) -> Self {
        cloudlet.status = CloudletStatus::Queued;
        Self {
            cloudlet,
            arrival_time: time,
            rate: 0.,
        }
    }
}

enum TaskStep {
    StartNext,
    FinishExecution,
    Receive(u32),
    Blocked,
}

#[derive(Clone, Debug)]
pub struct CloudletScheduler {
    policy: CloudletSchedulerPolicy,
    capacity: f64,
    pe_count: u32,
    running: Vec<Entry>,
    waiting: Vec<Entry>,
    paused: Vec<Entry>,
    inbox: Vec<Packet>,
    last_update: f64,
}

impl CloudletScheduler {
    /// Creates scheduler for a VM with `pe_count` PEs and total `capacity` MIPS.
    pub fn new(policy: CloudletSchedulerPolicy, capacity: f64, pe_count: u32) -> Self {
        Self {
            policy,
            capacity,
            pe_count: pe_count.max(1),
            running: Vec::new(),
            waiting: Vec::new(),
            paused: Vec::new(),
            inbox: Vec::new(),
            last_update: 0.,
        }
    }

    pub fn policy(&self) -> CloudletSchedulerPolicy {
        self.policy
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn mips_per_pe(&self) -> f64 {
        self.capacity / self.pe_count as f64
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    pub fn paused_count(&self) -> usize {
        self.paused.len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.is_empty() && self.waiting.is_empty() && self.paused.is_empty()
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.running.iter().chain(self.waiting.iter()).chain(self.paused.iter())
    }

    pub fn cloudlet(&self, id: u32) -> Option<&Cloudlet> {
        self.entries().map(|e| &e.cloudlet).find(|c| c.id == id)
    }

    pub fn cloudlet_ids(&self) -> Vec<u32> {
        self.entries().map(|e| e.cloudlet.id).collect()
    }

    /// Returns the current processing rate (MIPS) of the cloudlet.
    pub fn rate(&self, id: u32) -> Option<f64> {
        self.entries().find(|e| e.cloudlet.id == id).map(|e| e.rate)
    }

    /// Checks whether the cloudlet can be submitted.
    pub fn check(&self, cloudlet: &Cloudlet) -> Result<(), CloudError> {
        if self.cloudlet(cloudlet.id).is_some() {
            return Err(CloudError::invalid_spec(
                format!("cloudlet {}", cloudlet.id),
                "cloudlet is already submitted",
            ));
        }
        if self.policy == CloudletSchedulerPolicy::SpaceShared && cloudlet.pe_count > self.pe_count {
            return Err(CloudError::invalid_spec(
                format!("cloudlet {}", cloudlet.id),
                format!("requires {} PEs while VM has {}", cloudlet.pe_count, self.pe_count),
            ));
        }
        Ok(())
    }

    /// Adds the cloudlet to the waiting list, it is admitted for execution on the next update.
    pub fn submit(&mut self, cloudlet: Cloudlet, time: f64) -> Result<(), CloudError> {
        self.check(&cloudlet)?;
        self.advance(time);
        self.waiting.push(Entry::new(cloudlet, time));
        Ok(())
    }

    /// Changes the total MIPS available to cloudlets.
    pub fn set_capacity(&mut self, capacity: f64, time: f64) {
        self.advance(time);
        self.capacity = capacity.max(0.);
    }

    /// Removes the cloudlet from the scheduler keeping its status.
    pub fn remove(&mut self, id: u32, time: f64) -> Option<Cloudlet> {
        self.advance(time);
        self.take_entry(id).map(|e| e.cloudlet)
    }

    /// Removes the cloudlet and marks it as canceled.
    pub fn cancel(&mut self, id: u32, time: f64) -> Option<Cloudlet> {
        let mut cloudlet = self.remove(id, time)?;
        cloudlet.status = CloudletStatus::Canceled;
        Some(cloudlet)
    }

    /// Suspends execution of running or waiting cloudlet.
    pub fn pause(&mut self, id: u32, time: f64) -> bool {
        self.advance(time);
        let pos = match self
            .running
            .iter()
            .chain(self.waiting.iter())
            .position(|e| e.cloudlet.id == id)
        {
            Some(pos) => pos,
            None => return false,
        };
        let mut entry = if pos < self.running.len() {
            self.running.remove(pos)
        } else {
            self.waiting.remove(pos - self.running.len())
        };
        entry.rate = 0.;
        entry.cloudlet.status = CloudletStatus::Paused;
        self.paused.push(entry);
        true
    }

    /// Returns paused cloudlet to the waiting list.
    pub fn resume(&mut self, id: u32, time: f64) -> bool {
        self.advance(time);
        match self.paused.iter().position(|e| e.cloudlet.id == id) {
            Some(pos) => {
                let entry = self.paused.remove(pos);
                self.waiting.push(Entry::new(entry.cloudlet, time));
                true
            }
            None => false,
        }
    }

    /// Removes all cloudlets.
    pub fn take_all(&mut self, time: f64) -> Vec<Cloudlet> {
        self.advance(time);
        self.inbox.clear();
        let mut entries = mem::take(&mut self.running);
        entries.append(&mut self.waiting);
        entries.append(&mut self.paused);
        entries.into_iter().map(|e| e.cloudlet).collect()
    }

    /// Stores the packet addressed to a cloudlet of this VM.
    ///
    /// The packet is consumed by the receive task of the destination cloudlet, now or when the task starts.
    pub fn deliver_packet(&mut self, packet: Packet, time: f64) {
        self.advance(time);
        self.inbox.push(packet);
    }

    /// Completes the send task of the cloudlet after delivery of its packet to `dst_cloudlet`.
    pub fn complete_send(&mut self, id: u32, dst_cloudlet: u32, time: f64) -> bool {
        self.advance(time);
        let task = self
            .running
            .iter_mut()
            .find(|e| e.cloudlet.id == id)
            .and_then(|e| e.cloudlet.tasks_mut())
            .and_then(|tasks| tasks.current_mut());
        match task {
            Some(task) if !task.is_finished() => match task.kind {
                TaskKind::SendMessage { dst_cloudlet: dst, .. } if dst == dst_cloudlet => {
                    task.finish(time);
                    true
                }
                _ => false,
            },
            _ => false,
        }
    }

    /// Returns the predicted finish time of the cloudlet assuming that current rates are kept.
    ///
    /// Communication tasks of network cloudlets are not accounted.
    pub fn estimate_finish_time(&self, id: u32) -> Option<f64> {
        let entry = self.running.iter().find(|e| e.cloudlet.id == id)?;
        if entry.rate > 0. {
            Some(self.last_update + entry.cloudlet.remaining_length() / entry.rate)
        } else {
            None
        }
    }

    /// Accounts the work done since the previous update, advances task state machines,
    /// collects finished cloudlets, admits waiting cloudlets and recomputes rates.
    pub fn update(&mut self, time: f64) -> SchedulerUpdate {
        self.advance(time);
        let mut result = SchedulerUpdate::default();
        loop {
            for entry in self.running.iter_mut() {
                progress_tasks(&mut entry.cloudlet, &mut self.inbox, time, &mut result.packets);
            }
            self.collect_finished(time, &mut result.finished);
            let admitted = self.admit(time);
            self.compute_rates(time);
            let completed = self.complete_imminent(time);
            if !admitted && !completed {
                break;
            }
        }
        result.next_event = self
            .running
            .iter()
            .filter(|e| e.rate > 0.)
            .map(|e| time + e.cloudlet.current_demand() / e.rate)
            .min_by(|a, b| a.total_cmp(b));
        result
    }

    fn advance(&mut self, time: f64) {
        let elapsed = time - self.last_update;
        if elapsed > 0. {
            for entry in self.running.iter_mut().filter(|e| e.rate > 0.) {
                let work = (elapsed * entry.rate).min(entry.cloudlet.current_demand());
                entry.cloudlet.advance(work);
            }
            self.last_update = time;
        }
    }

    fn take_entry(&mut self, id: u32) -> Option<Entry> {
        for list in [&mut self.running, &mut self.waiting, &mut self.paused] {
            if let Some(pos) = list.iter().position(|e| e.cloudlet.id == id) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    fn collect_finished(&mut self, time: f64, finished: &mut Vec<Cloudlet>) {
        let (done, running): (Vec<Entry>, Vec<Entry>) =
            mem::take(&mut self.running).into_iter().partition(|e| e.cloudlet.is_finished());
        self.running = running;
        for entry in done {
            let mut cloudlet = entry.cloudlet;
            cloudlet.status = CloudletStatus::Success;
            cloudlet.finish_time = Some(time);
            finished.push(cloudlet);
        }
    }

    fn admit(&mut self, time: f64) -> bool {
        if self.waiting.is_empty() {
            return false;
        }
        self.waiting.sort_by(|a, b| {
            a.arrival_time
                .total_cmp(&b.arrival_time)
                .then(a.cloudlet.id.cmp(&b.cloudlet.id))
        });
        let admitted_count = match self.policy {
            CloudletSchedulerPolicy::TimeShared => self.waiting.len(),
            CloudletSchedulerPolicy::SpaceShared => {
                let mut used_pes: u64 = self.running.iter().map(|e| e.cloudlet.pe_count as u64).sum();
                let mut count = 0;
                for entry in self.waiting.iter() {
                    if used_pes + entry.cloudlet.pe_count as u64 > self.pe_count as u64 {
                        break;
                    }
                    used_pes += entry.cloudlet.pe_count as u64;
                    count += 1;
                }
                count
            }
        };
        for mut entry in self.waiting.drain(..admitted_count) {
            entry.cloudlet.status = CloudletStatus::InExec;
            entry.cloudlet.exec_start_time.get_or_insert(time);
            self.running.push(entry);
        }
        admitted_count > 0
    }

    fn compute_rates(&mut self, time: f64) {
        let mips_per_pe = self.mips_per_pe();
        let active_pes: u64 = self
            .running
            .iter()
            .filter(|e| e.cloudlet.current_demand() > 0.)
            .map(|e| e.cloudlet.pe_count as u64)
            .sum();
        for entry in self.running.iter_mut() {
            if entry.cloudlet.current_demand() <= 0. {
                entry.rate = 0.;
                continue;
            }
            let pes = entry.cloudlet.pe_count as f64;
            let share = match self.policy {
                CloudletSchedulerPolicy::TimeShared => {
                    (pes * mips_per_pe).min(self.capacity * pes / active_pes as f64)
                }
                CloudletSchedulerPolicy::SpaceShared => pes * mips_per_pe,
            };
            entry.rate = share * entry.cloudlet.utilization_cpu.utilization(time);
        }
    }

    // Completes the work whose predicted finish time is not distinguishable from the current time.
    fn complete_imminent(&mut self, time: f64) -> bool {
        let mut completed = false;
        for entry in self.running.iter_mut().filter(|e| e.rate > 0.) {
            let demand = entry.cloudlet.current_demand();
            if demand > 0. && time + demand / entry.rate <= time {
                entry.cloudlet.advance(demand);
                completed = true;
            }
        }
        completed
    }
}

fn progress_tasks(cloudlet: &mut Cloudlet, inbox: &mut Vec<Packet>, time: f64, packets: &mut Vec<Packet>) {
    let id = cloudlet.id;
    let tasks = match cloudlet.tasks_mut() {
        Some(tasks) => tasks,
        None => return,
    };
    loop {
        let step = match tasks.current() {
            None => TaskStep::StartNext,
            Some(task) if task.is_finished() => TaskStep::StartNext,
            Some(task) => match task.kind {
                TaskKind::Execution { .. } if task.remaining_length() == 0. => TaskStep::FinishExecution,
                TaskKind::ReceiveMessage { src_cloudlet } => TaskStep::Receive(src_cloudlet),
                _ => TaskStep::Blocked,
            },
        };
        match step {
            TaskStep::StartNext => match tasks.start_next_task(time) {
                Some(task) => {
                    if let TaskKind::SendMessage { dst_cloudlet, payload } = task.kind {
                        packets.push(Packet {
                            src_cloudlet: id,
                            dst_cloudlet,
                            payload,
                            send_time: time,
                        });
                    }
                }
                None => break,
            },
            TaskStep::FinishExecution => {
                if let Some(task) = tasks.current_mut() {
                    task.finish(time);
                }
            }
            TaskStep::Receive(src_cloudlet) => {
                match inbox
                    .iter()
                    .position(|p| p.src_cloudlet == src_cloudlet && p.dst_cloudlet == id)
                {
                    Some(pos) => {
                        inbox.remove(pos);
                        if let Some(task) = tasks.current_mut() {
                            task.finish(time);
                        }
                    }
                    None => break,
                }
            }
            TaskStep::Blocked => break,
        }
    }
}
