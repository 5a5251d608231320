// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::info;
use tri_core::{RenderResult, Stage, StageExt};

use crate::driver::{Driver, QueueRequest};
use crate::probe::{QueueFamilies, REQUIRED_DEVICE_EXTENSIONS};

const QUEUE_PRIORITY: f32 = 1.0;

#[derive(Clone, Copy, Debug)]
pub struct Queues {
    pub families: QueueFamilies,
    pub graphics: vk::Queue,
    pub present: vk::Queue,
}

/// One request per distinct family; a shared graphics/present family is
/// requested once.
pub fn queue_requests(families: &QueueFamilies) -> Vec<QueueRequest> {
    families
        .unique()
        .into_iter()
        .map(|family_index| QueueRequest {
            family_index,
            priority: QUEUE_PRIORITY,
        })
        .collect()
}

/// Creates the logical device with no optional features and fetches the
/// first queue of each family.
pub fn create_logical_device<D: Driver + ?Sized>(
    driver: &mut D,
    phys: vk::PhysicalDevice,
    families: QueueFamilies,
) -> RenderResult<Queues> {
    let requests = queue_requests(&families);
    driver
        .create_device(phys, &requests, REQUIRED_DEVICE_EXTENSIONS)
        .stage(Stage::LogicalDevice)?;

    let queues = Queues {
        families,
        graphics: driver.queue(families.graphics),
        present: driver.queue(families.present),
    };
    info!(
        "logical device ready ({} queue family request(s))",
        requests.len()
    );
    Ok(queues)
}
