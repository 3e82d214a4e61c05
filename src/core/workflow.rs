//! The fixed eight-stage regulatory workflow every modernization project
//! moves through.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::StoreError;

pub const STEP_COUNT: u8 = 8;

/// Identifier of a workflow step, always within `1..=8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct StepId(u8);

impl StepId {
    pub fn new(id: u8) -> Result<Self, StoreError> {
        if (1..=STEP_COUNT).contains(&id) {
            Ok(StepId(id))
        } else {
            Err(StoreError::Validation(format!(
                "step id {id} outside 1..={STEP_COUNT}"
            )))
        }
    }

    pub fn first() -> Self {
        StepId(1)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn all() -> impl Iterator<Item = StepId> {
        (1..=STEP_COUNT).map(StepId)
    }

    pub fn definition(self) -> &'static WorkflowStep {
        &WORKFLOW_STEPS[usize::from(self.0 - 1)]
    }
}

impl TryFrom<u8> for StepId {
    type Error = StoreError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        StepId::new(value)
    }
}

impl TryFrom<i64> for StepId {
    type Error = StoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| StoreError::Validation(format!("step id {value} outside 1..={STEP_COUNT}")))
            .and_then(StepId::new)
    }
}

impl From<StepId> for u8 {
    fn from(id: StepId) -> Self {
        id.0
    }
}

impl From<StepId> for i64 {
    fn from(id: StepId) -> Self {
        i64::from(id.0)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct WorkflowStep {
    pub id: u8,
    pub title: &'static str,
    pub description: &'static str,
}

pub static WORKFLOW_STEPS: [WorkflowStep; STEP_COUNT as usize] = [
    WorkflowStep {
        id: 1,
        title: "拟定电梯更新改造方式",
        description: "申请人或代理人结合电梯日常运行使用和维保情况等因素，拟定老旧电梯更新改造方式。",
    },
    WorkflowStep {
        id: 2,
        title: "委托专业机构开展安全评估",
        description: "委托专业机构开展安全评估。评估结论为更新或改造的继续后续流程。",
    },
    WorkflowStep {
        id: 3,
        title: "编制更新改造方案",
        description: "更新改造方案应包括旧电梯基本情况，使用年限、拆除（维修）方式，新的电梯（或部件）品牌、型号、规格、配置、费用、施工周期等。",
    },
    WorkflowStep {
        id: 4,
        title: "组织全体业主表决",
        description: "组织业主对电梯更新改造方案进行表决，参与率和同意率达到规定要求后，通过电梯更新改造方案。",
    },
    WorkflowStep {
        id: 5,
        title: "组织招标",
        description: "明确电梯更新需求，发布招标公告，组织专业人员对投标方进行评审，选出中标单位。",
    },
    WorkflowStep {
        id: 6,
        title: "组织项目实施",
        description: "中标后，签订委托施工合同，施工前向市场监管部门办理施工告知手续，落实安全防护措施。",
    },
    WorkflowStep {
        id: 7,
        title: "办理监督检验和使用登记",
        description: "完工后，向特种设备检验机构申报监督检验，向市场监管部门办理特种设备使用登记证。",
    },
    WorkflowStep {
        id: 8,
        title: "申请拨付补助资金",
        description: "竣工验收完成并取得特种设备使用登记证后，向街道（镇）提出财政补助申请。",
    },
];
