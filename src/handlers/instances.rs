//! Instance-scaling adapters: thin bridges from bus subjects to the
//! workload orchestrator's job and allocation APIs. Each failure maps to a
//! stable error code; the orchestrator's own messages stay in the logs.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tracing::{info, warn};

use crate::bus::{Bus, subjects};
use crate::orchestrator::Orchestrator;
use crate::protocol::packets::{
    InstanceCreateRequest, InstanceDeleteAllRequest, InstanceDeleteRequest, InstanceResponse,
};

pub async fn register(bus: &Bus, orchestrator: &Arc<dyn Orchestrator>) -> anyhow::Result<()> {
    create_handler(bus.clone(), orchestrator.clone()).await?;
    delete_handler(bus.clone(), orchestrator.clone()).await?;
    delete_all_handler(bus.clone(), orchestrator.clone()).await?;
    update_handler(bus.clone(), orchestrator.clone()).await?;
    Ok(())
}

async fn create_handler(bus: Bus, orchestrator: Arc<dyn Orchestrator>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_CREATE).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<InstanceCreateRequest>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid instance create payload");
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            let job = match orchestrator.job_info(&packet.instance_type).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(instance_type = %packet.instance_type, error = %e, "job lookup failed");
                    bus.respond_json(&msg, &InstanceResponse::err("JOB_NOT_FOUND")).await;
                    continue;
                }
            };

            let current = job
                .task_groups
                .iter()
                .find(|g| g.name.as_deref() == Some(packet.instance_type.as_str()))
                .and_then(|g| g.count)
                .unwrap_or(0);
            let count = current + packet.quantity;

            if let Err(e) = orchestrator
                .scale_group(&job.id, &packet.instance_type, count, "Adding instance(s)")
                .await
            {
                warn!(job_id = %job.id, error = %e, "job scaling failed");
                bus.respond_json(&msg, &InstanceResponse::err("JOB_SCALING_FAILED"))
                    .await;
                continue;
            }

            info!(job_id = %job.id, count, "scaled instance group up");
            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}

async fn delete_handler(bus: Bus, orchestrator: Arc<dyn Orchestrator>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_DELETE).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<InstanceDeleteRequest>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid instance delete payload");
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            let alloc = match orchestrator.allocation_info(&packet.alloc_id).await {
                Ok(alloc) => alloc,
                Err(e) => {
                    warn!(alloc_id = %packet.alloc_id, error = %e, "allocation lookup failed");
                    bus.respond_json(&msg, &InstanceResponse::err("ALLOCATION_NOT_FOUND"))
                        .await;
                    continue;
                }
            };

            if let Err(e) = orchestrator.stop_allocation(&alloc.id).await {
                warn!(alloc_id = %alloc.id, error = %e, "failed to stop allocation");
                bus.respond_json(&msg, &InstanceResponse::err("FAILED_TO_STOP_ALLOCATION"))
                    .await;
                continue;
            }
            info!(alloc_id = %alloc.id, "stopped allocation");

            // Shrink the group count so the scheduler doesn't replace the
            // stopped allocation.
            let mut job = match orchestrator.job_info(&packet.instance_type).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(instance_type = %packet.instance_type, error = %e, "job lookup failed");
                    bus.respond_json(&msg, &InstanceResponse::err("JOB_NOT_FOUND")).await;
                    continue;
                }
            };

            for group in &mut job.task_groups {
                if group.name.as_deref() == Some(packet.instance_type.as_str()) {
                    group.count = Some(group.count.unwrap_or(0).saturating_sub(1));
                }
            }

            if let Err(e) = orchestrator.register_job(&job).await {
                warn!(job_id = %job.id, error = %e, "job registration failed");
                bus.respond_json(&msg, &InstanceResponse::err("JOB_REGISTRATION_FAILED"))
                    .await;
                continue;
            }

            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}

async fn delete_all_handler(bus: Bus, orchestrator: Arc<dyn Orchestrator>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_DELETE_ALL).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<InstanceDeleteAllRequest>(&msg.payload)
            else {
                warn!(subject = %msg.subject, "invalid instance delete-all payload");
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            let job = match orchestrator.job_info(&packet.instance_type).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(instance_type = %packet.instance_type, error = %e, "job lookup failed");
                    bus.respond_json(&msg, &InstanceResponse::err("JOB_NOT_FOUND")).await;
                    continue;
                }
            };

            if let Err(e) = orchestrator
                .scale_group(&job.id, &packet.instance_type, 0, "Removing all instances")
                .await
            {
                warn!(job_id = %job.id, error = %e, "scale to zero failed");
                bus.respond_json(&msg, &InstanceResponse::err("SCALE_TO_ZERO_FAILED"))
                    .await;
                continue;
            }

            info!(job_id = %job.id, "scaled instance group to zero");
            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}

async fn update_handler(bus: Bus, orchestrator: Arc<dyn Orchestrator>) -> anyhow::Result<()> {
    let mut sub = bus.subscribe(subjects::SERVERS_UPDATE).await?;
    tokio::spawn(async move {
        while let Some(msg) = sub.next().await {
            let Ok(packet) = serde_json::from_slice::<InstanceCreateRequest>(&msg.payload) else {
                warn!(subject = %msg.subject, "invalid instance update payload");
                bus.respond_json(&msg, &InstanceResponse::err("INVALID_MESSAGE_FORMAT"))
                    .await;
                continue;
            };

            let mut job = match orchestrator.job_info(&packet.instance_type).await {
                Ok(job) => job,
                Err(e) => {
                    warn!(instance_type = %packet.instance_type, error = %e, "job lookup failed");
                    bus.respond_json(&msg, &InstanceResponse::err("JOB_NOT_FOUND")).await;
                    continue;
                }
            };

            // Touching job meta forces the scheduler to roll the group.
            let trigger = Utc::now().timestamp_nanos_opt().unwrap_or_default();
            job.meta
                .get_or_insert_with(Default::default)
                .insert("update_trigger".to_string(), trigger.to_string());

            if let Err(e) = orchestrator.register_job(&job).await {
                warn!(job_id = %job.id, error = %e, "job registration failed");
                bus.respond_json(&msg, &InstanceResponse::err("JOB_REGISTRATION_FAILED"))
                    .await;
                continue;
            }

            info!(job_id = %job.id, "triggered rolling update");
            bus.respond_json(&msg, &InstanceResponse::ok()).await;
        }
    });
    Ok(())
}
