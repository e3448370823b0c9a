//! Standard simulation events.

// VM EVENTS ///////////////////////////////////////////////////////////////////////////////////////

pub mod vm {
    use serde::Serialize;

    use crate::core::vm::VmSpec;

    #[derive(Serialize, Clone)]
    pub struct VmCreateRequest {
        pub vm: VmSpec,
    }

    #[derive(Serialize, Clone)]
    pub struct VmCreated {
        pub vm_id: u32,
        pub host_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmAllocationFailed {
        pub vm_id: u32,
        pub reason: String,
    }

    #[derive(Serialize, Clone)]
    pub struct VmDestroy {
        pub vm_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmDestroyed {
        pub vm_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmMigrationRequest {
        pub vm_id: u32,
        /// Target host, selected by the allocation policy if not set.
        pub target_host: Option<u32>,
    }

    #[derive(Serialize, Clone)]
    pub struct VmMigrated {
        pub vm_id: u32,
        pub source_host: u32,
        pub target_host: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct VmMigrationFailed {
        pub vm_id: u32,
        pub reason: String,
    }

    #[derive(Serialize, Clone)]
    pub struct VmScaleRequest {
        pub vm_id: u32,
        pub mips_per_pe: f64,
    }

    #[derive(Serialize, Clone)]
    pub struct VmScaled {
        pub vm_id: u32,
        pub mips_per_pe: f64,
    }

    #[derive(Serialize, Clone)]
    pub struct VmScaleFailed {
        pub vm_id: u32,
        pub reason: String,
    }

    /// Requests update of VM cloudlet scheduler, coalesces changes made at the same time.
    #[derive(Serialize, Clone)]
    pub struct VmUpdate {
        pub vm_id: u32,
    }
}

// CLOUDLET EVENTS /////////////////////////////////////////////////////////////////////////////////

pub mod cloudlet {
    use serde::Serialize;

    use crate::core::cloudlet::Cloudlet;

    #[derive(Serialize, Clone)]
    pub struct CloudletSubmit {
        pub cloudlet: Cloudlet,
    }

    /// Predicted completion of cloudlet or its execution task on the VM.
    #[derive(Serialize, Clone)]
    pub struct CloudletFinish {
        pub vm_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletReturn {
        pub cloudlet: Cloudlet,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletRejected {
        pub cloudlet: Cloudlet,
        pub reason: String,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletPause {
        pub cloudlet_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletResume {
        pub cloudlet_id: u32,
    }

    #[derive(Serialize, Clone)]
    pub struct CloudletCancel {
        pub cloudlet_id: u32,
    }
}

// NETWORK EVENTS //////////////////////////////////////////////////////////////////////////////////

pub mod network {
    use serde::Serialize;

    use crate::core::cloudlet_scheduler::Packet;

    /// Transfer of the packet from the sender VM is completed.
    #[derive(Serialize, Clone)]
    pub struct PacketDelivered {
        pub packet: Packet,
    }

    /// Packet whose destination cloudlet is not hosted by the sender datacenter,
    /// passed to the broker owning the sender.
    #[derive(Serialize, Clone)]
    pub struct PacketForward {
        pub packet: Packet,
    }

    /// Packet routed by the broker to the datacenter of the destination cloudlet.
    #[derive(Serialize, Clone)]
    pub struct PacketRouted {
        pub packet: Packet,
    }
}
