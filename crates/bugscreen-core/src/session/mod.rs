//! Resolution and patch session
//!
//! One session resolves every location named by the profile, builds and checks
//! every write named by the plan, and only then touches memory.

#[cfg(test)]
pub(crate) mod fixture;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::memory::{Address, MappingProvider, ReadMemory};
use crate::patch::{PatchRequest, apply_all};
use crate::profile::{PatchPlan, SignatureProfile};
use crate::record::{RecordField, ResolutionRecord};
use crate::resolve::{
    AnchorResolver, bind_chain, resolve_chain, resolve_function, scan_for_locations,
};

/// Outcome of a completed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub record: ResolutionRecord,
    pub colour_address: Option<Address>,
    pub patched: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    profile: SignatureProfile,
    plan: PatchPlan,
}

impl Session {
    pub fn new(profile: SignatureProfile, plan: PatchPlan) -> Self {
        Self { profile, plan }
    }

    pub fn profile(&self) -> &SignatureProfile {
        &self.profile
    }

    pub fn plan(&self) -> &PatchPlan {
        &self.plan
    }

    /// Resolve every record field without writing anything
    pub fn resolve<R, A>(&self, reader: &R, anchors: &A) -> Result<ResolutionRecord>
    where
        R: ReadMemory + ?Sized,
        A: AnchorResolver + ?Sized,
    {
        let mut record = ResolutionRecord::new();

        debug!("Phase 1: Resolving anchor {}...", self.profile.anchor);
        let mut cursor = anchors.require_anchor(&self.profile.anchor)?;
        debug!("  {}: {}", self.profile.anchor, cursor);

        for (i, stage) in self.profile.stages.iter().enumerate() {
            debug!("Phase {}: Searching {} from {}...", i + 2, stage.field, cursor);
            cursor = resolve_function(
                reader,
                cursor,
                &stage.signatures,
                &stage.sentinel,
                stage.max_scan,
            )?;
            record.set_address(stage.field, cursor);
            debug!("  {}: {}", stage.field, cursor);
        }

        let locations = &self.profile.locations;
        let start = record.address(locations.start)?;
        debug!(
            "Phase {}: Scanning {} rules from {}...",
            self.profile.stages.len() + 2,
            locations.rules.len(),
            start
        );
        let found = scan_for_locations(
            reader,
            start,
            locations.max_scan,
            &locations.rules,
            &locations.sentinel,
        )?;
        record.merge(found);

        record.require_complete()?;
        info!("Resolved all {} locations", record.iter().count());
        Ok(record)
    }

    /// Follow the colour chain from a complete record
    pub fn colour_address<R: ReadMemory + ?Sized>(
        &self,
        reader: &R,
        record: &ResolutionRecord,
    ) -> Result<Address> {
        let chain = &self.profile.colour_chain;
        let valid = reader.mapped_range().ok_or_else(|| {
            Error::InvalidChain("reader does not expose a valid address range".to_string())
        })?;
        let steps = bind_chain(&chain.steps, record)?;
        resolve_chain(reader, record.address(chain.start)?, &steps, &valid)
    }

    /// Every write of the plan, in application order, already size-checked
    pub fn build_requests<R: ReadMemory + ?Sized>(
        &self,
        reader: &R,
        record: &ResolutionRecord,
        colour: Option<Address>,
    ) -> Result<Vec<PatchRequest>> {
        let plan = &self.plan;
        let mut requests = vec![
            PatchRequest::string(
                reader,
                "face",
                record.address(RecordField::ConfigHandlerTable)?,
                &plan.face.text,
                plan.face.max_units,
            )?,
            PatchRequest::string(
                reader,
                "messageOne",
                record.address(RecordField::MessageSlotOne)?,
                &plan.message_one.text,
                plan.message_one.max_units,
            )?,
            PatchRequest::string(
                reader,
                "messageTwo",
                record.address(RecordField::MessageSlotTwo)?,
                &plan.message_two.text,
                plan.message_two.max_units,
            )?,
        ];
        if let Some(address) = colour {
            requests.push(PatchRequest::scalar_u32("colour", address, plan.colour));
        }

        for request in &requests {
            request.validate()?;
        }
        Ok(requests)
    }

    /// Resolve, then apply the whole plan
    ///
    /// Any resolution or size failure returns before the first mapping is taken.
    pub fn run<S, A>(&self, space: &mut S, anchors: &A) -> Result<SessionReport>
    where
        S: ReadMemory + MappingProvider,
        A: AnchorResolver + ?Sized,
    {
        let record = self.resolve(&*space, anchors)?;

        let colour_address = if self.plan.patch_colour {
            let address = self.colour_address(&*space, &record)?;
            debug!("  colour: {}", address);
            Some(address)
        } else {
            debug!("  colour: skipped");
            None
        };

        let requests = self.build_requests(&*space, &record, colour_address)?;
        info!("Applying {} patches...", requests.len());
        let patched = apply_all(space, &requests)?;

        Ok(SessionReport {
            record,
            colour_address,
            patched,
            completed_at: Utc::now(),
        })
    }
}
