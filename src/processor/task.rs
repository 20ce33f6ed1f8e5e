// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::driver::RelayDevice;
use crate::error::Result;
use crate::processor::TaskProcessor;
use log::info;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Open,
    Close,
    Dispose,
}

impl TaskKind {
    pub fn label(self) -> &'static str {
        match self {
            TaskKind::Open => "open",
            TaskKind::Close => "close",
            TaskKind::Dispose => "dispose",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One lifecycle call into a device.
///
/// Tasks for drivers that are not thread-safe go through the processor;
/// the others run on the calling thread.
pub struct RelayTask {
    kind: TaskKind,
    device: Arc<dyn RelayDevice>,
    serialize: bool,
}

impl RelayTask {
    pub fn new(kind: TaskKind, device: Arc<dyn RelayDevice>, thread_safe: bool) -> Self {
        Self {
            kind,
            device,
            serialize: !thread_safe,
        }
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn requires_serialization(&self) -> bool {
        self.serialize
    }

    pub fn process(self, processor: &TaskProcessor) -> Result<()> {
        if !self.serialize || processor.is_worker_thread() {
            return self.handle();
        }
        let task = self.kind.label();
        let device = self.device.name();
        processor.process(task, &device, move || self.handle())
    }

    fn handle(&self) -> Result<()> {
        let device = &self.device;
        match self.kind {
            TaskKind::Open => {
                if device.is_open() {
                    return Ok(());
                }
                info!("Opening relay {}", device.name());
                device.open()
            }
            TaskKind::Close => {
                if !device.is_open() {
                    return Ok(());
                }
                info!("Closing relay {}", device.name());
                device.close()
            }
            TaskKind::Dispose => device.dispose(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDevice;

    #[test]
    fn open_and_close_skip_redundant_calls() {
        let processor = TaskProcessor::default();
        let device = Arc::new(DummyDevice::new("A"));
        let shared: Arc<dyn RelayDevice> = device.clone();

        RelayTask::new(TaskKind::Close, shared.clone(), false)
            .process(&processor)
            .unwrap();
        RelayTask::new(TaskKind::Open, shared.clone(), false)
            .process(&processor)
            .unwrap();
        RelayTask::new(TaskKind::Open, shared.clone(), false)
            .process(&processor)
            .unwrap();
        RelayTask::new(TaskKind::Close, shared, false)
            .process(&processor)
            .unwrap();

        assert_eq!(device.open_calls(), 1);
        assert_eq!(device.close_calls(), 1);
        assert!(!device.is_open());
    }

    #[test]
    fn thread_safe_tasks_bypass_processor() {
        let processor = TaskProcessor::default();
        let device: Arc<dyn RelayDevice> = Arc::new(DummyDevice::new("B"));

        let task = RelayTask::new(TaskKind::Dispose, device, true);
        assert!(!task.requires_serialization());
        task.process(&processor).unwrap();
        assert!(!processor.is_started());
    }

    #[test]
    fn serialized_tasks_fail_after_shutdown() {
        let processor = TaskProcessor::default();
        processor.shutdown();
        let device: Arc<dyn RelayDevice> = Arc::new(DummyDevice::new("C"));
        let task = RelayTask::new(TaskKind::Open, device.clone(), false);
        assert!(task.process(&processor).is_err());
        assert!(!device.is_open());
    }
}
