// (c) Copyright 2025 Helsing GmbH. All rights reserved.
mod qc_arbitrary_impls;
